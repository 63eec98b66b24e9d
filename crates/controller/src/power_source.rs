//! Voting power sources
//!
//! A voter's power is the plain sum over every registered source. Sources are
//! read exactly once per allocation change; the engine never subscribes to them.

use crate::errors::{EmissionsError, Result};
use emissions_types::{Power, Timestamp, VoterId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// External provider of point-in-time voting power.
pub trait VotingPowerSource: Send + Sync {
    /// Short name used in logs and error reports.
    fn name(&self) -> &str;

    /// Voting power of `voter`, optionally as of `at`.
    fn power_of(&self, voter: &VoterId, at: Option<Timestamp>) -> anyhow::Result<Power>;
}

/// Sum a voter's power across all sources.
///
/// The first failing source aborts the read; nothing is partially summed.
pub fn total_power(
    sources: &[Arc<dyn VotingPowerSource>],
    voter: &VoterId,
    at: Option<Timestamp>,
) -> Result<Power> {
    let mut total: Power = 0;
    for source in sources {
        let power =
            source
                .power_of(voter, at)
                .map_err(|err| EmissionsError::PowerSourceFailure {
                    source_name: source.name().to_string(),
                    reason: format!("{err:#}"),
                })?;
        total = total
            .checked_add(power)
            .ok_or(EmissionsError::ArithmeticOverflow("voting power sum"))?;
    }
    Ok(total)
}

// -----------------------------------------------------------------------------
// In-memory source (for simulation and testing)
// -----------------------------------------------------------------------------

/// Table-backed source whose balances can be changed at any time.
#[derive(Debug, Default)]
pub struct StaticPowerSource {
    name: String,
    powers: RwLock<HashMap<VoterId, Power>>,
}

impl StaticPowerSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            powers: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_powers(
        name: impl Into<String>,
        powers: impl IntoIterator<Item = (VoterId, Power)>,
    ) -> Self {
        let source = Self::new(name);
        source.powers.write().extend(powers);
        source
    }

    pub fn set_power(&self, voter: VoterId, power: Power) {
        self.powers.write().insert(voter, power);
    }

    pub fn remove(&self, voter: &VoterId) -> Option<Power> {
        self.powers.write().remove(voter)
    }
}

impl VotingPowerSource for StaticPowerSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn power_of(&self, voter: &VoterId, _at: Option<Timestamp>) -> anyhow::Result<Power> {
        Ok(self.powers.read().get(voter).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emissions_types::units;

    struct OfflineSource;

    impl VotingPowerSource for OfflineSource {
        fn name(&self) -> &str {
            "offline"
        }

        fn power_of(&self, _voter: &VoterId, _at: Option<Timestamp>) -> anyhow::Result<Power> {
            anyhow::bail!("node unreachable")
        }
    }

    #[test]
    fn sums_across_sources() {
        let alice = VoterId::from_label("alice");
        let staking = StaticPowerSource::with_powers("staking", [(alice, units(100))]);
        let locked = StaticPowerSource::with_powers("locked", [(alice, units(200))]);
        let sources: Vec<Arc<dyn VotingPowerSource>> = vec![Arc::new(staking), Arc::new(locked)];

        assert_eq!(total_power(&sources, &alice, None).unwrap(), units(300));
        assert_eq!(
            total_power(&sources, &VoterId::from_label("nobody"), None).unwrap(),
            0
        );
    }

    #[test]
    fn failing_source_aborts_read() {
        let alice = VoterId::from_label("alice");
        let sources: Vec<Arc<dyn VotingPowerSource>> = vec![
            Arc::new(StaticPowerSource::with_powers("staking", [(alice, 5)])),
            Arc::new(OfflineSource),
        ];
        let err = total_power(&sources, &alice, Some(10)).unwrap_err();
        match err {
            EmissionsError::PowerSourceFailure {
                source_name,
                reason,
            } => {
                assert_eq!(source_name, "offline");
                assert!(reason.contains("unreachable"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn overflowing_sum_is_rejected() {
        let alice = VoterId::from_label("alice");
        let sources: Vec<Arc<dyn VotingPowerSource>> = vec![
            Arc::new(StaticPowerSource::with_powers("a", [(alice, u128::MAX)])),
            Arc::new(StaticPowerSource::with_powers("b", [(alice, 1)])),
        ];
        assert!(matches!(
            total_power(&sources, &alice, None),
            Err(EmissionsError::ArithmeticOverflow(_))
        ));
    }

    #[test]
    fn static_source_updates_in_place() {
        let alice = VoterId::from_label("alice");
        let source = StaticPowerSource::new("staking");
        source.set_power(alice, 7);
        assert_eq!(source.power_of(&alice, None).unwrap(), 7);
        assert_eq!(source.remove(&alice), Some(7));
        assert_eq!(source.power_of(&alice, None).unwrap(), 0);
    }
}
