//! Persisted state surface
//!
//! A snapshot is the full dial table, allocation table, epoch scalars and
//! retry queue. Restoring re-derives the grand total from the dial table and
//! refuses any snapshot whose dial totals disagree with its allocations.

use crate::aggregator::VoteAggregator;
use crate::allocation::{AllocationLedger, VoterAllocation};
use crate::controller::{ControllerState, EmissionsController};
use crate::dials::{Dial, DialRegistry};
use crate::distributor::{EpochState, PendingTransfer};
use crate::errors::{EmissionsError, Result};
use crate::params::EmissionsParams;
use crate::power_source::VotingPowerSource;
use emissions_types::Clock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub version: u32,
    pub params: EmissionsParams,
    pub initialized: bool,
    pub dials: Vec<Dial>,
    pub allocations: Vec<VoterAllocation>,
    pub epoch: EpochState,
    pub pending: Vec<PendingTransfer>,
}

impl ControllerSnapshot {
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl EmissionsController {
    /// Capture the persisted state surface.
    pub fn snapshot(&self) -> ControllerSnapshot {
        let state = self.state.read();
        ControllerSnapshot {
            version: SNAPSHOT_VERSION,
            params: self.params().clone(),
            initialized: state.initialized,
            dials: state.dials.as_slice().to_vec(),
            allocations: state.allocations.sorted(),
            epoch: state.epoch.clone(),
            pending: state.pending.clone(),
        }
    }

    /// Rebuild a controller from a snapshot with fresh collaborators.
    pub fn restore(
        snapshot: ControllerSnapshot,
        sources: Vec<Arc<dyn VotingPowerSource>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EmissionsError::CorruptSnapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        snapshot.params.validate()?;
        let epoch = &snapshot.epoch;
        if epoch.total_reward_budget != snapshot.params.total_reward_budget
            || epoch.total_epochs != snapshot.params.total_epochs
            || epoch.epoch_reward != snapshot.params.epoch_reward()
            || epoch.epoch_duration_secs != snapshot.params.epoch_duration_secs
        {
            return Err(EmissionsError::CorruptSnapshot(
                "epoch state does not match parameters".into(),
            ));
        }

        let dials = DialRegistry::from_dials(snapshot.dials)?;
        let total_votes = dials
            .active_votes()
            .ok_or(EmissionsError::ArithmeticOverflow("restored vote total"))?;

        let mut state = ControllerState::new(snapshot.epoch);
        state.initialized = snapshot.initialized;
        state.dials = dials;
        state.allocations = AllocationLedger::from_allocations(snapshot.allocations)?;
        state.votes = VoteAggregator::new(total_votes);
        state.pending = snapshot.pending;

        state
            .verify_conservation()
            .map_err(|err| EmissionsError::CorruptSnapshot(err.to_string()))?;

        info!(
            target: "emissions",
            dials = state.dials.len(),
            voters = state.allocations.len(),
            total_votes,
            "emissions controller restored"
        );
        Ok(EmissionsController::from_parts(
            snapshot.params,
            sources,
            clock,
            state,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AllocationEntry;
    use crate::power_source::StaticPowerSource;
    use crate::reward_ledger::InMemoryRewardLedger;
    use emissions_types::{scaled, units, DialId, ManualClock, RecipientId, VoterId};

    fn populated() -> (EmissionsController, Arc<ManualClock>) {
        let alice = VoterId::from_label("alice");
        let source = StaticPowerSource::with_powers("staking", [(alice, units(300))]);
        let sources: Vec<Arc<dyn VotingPowerSource>> = vec![Arc::new(source)];
        let clock = Arc::new(ManualClock::new(0));
        let controller =
            EmissionsController::new(EmissionsParams::default(), sources, clock.clone()).unwrap();
        controller
            .initialize(&[RecipientId([1; 32]), RecipientId([2; 32])])
            .unwrap();
        controller
            .set_voter_weights(
                alice,
                vec![
                    AllocationEntry::new(DialId(0), scaled(2, 17)),
                    AllocationEntry::new(DialId(1), scaled(8, 17)),
                ],
            )
            .unwrap();
        clock.advance(emissions_types::ONE_WEEK_SECS);
        controller
            .distribute_rewards(&mut InMemoryRewardLedger::new())
            .unwrap();
        (controller, clock)
    }

    #[test]
    fn snapshot_file_restores_same_state() {
        let (controller, clock) = populated();
        let snapshot = controller.snapshot();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emissions.json");
        snapshot.save_json(&path).unwrap();
        let loaded = ControllerSnapshot::load_json(&path).unwrap();
        assert_eq!(loaded, snapshot);

        let restored = EmissionsController::restore(loaded, vec![], clock).unwrap();
        assert_eq!(restored.total_dial_votes(), controller.total_dial_votes());
        assert_eq!(restored.dials(), controller.dials());
        assert_eq!(restored.epoch_state(), controller.epoch_state());
        assert_eq!(restored.snapshot(), snapshot);
    }

    #[test]
    fn tampered_dial_totals_are_rejected() {
        let (controller, clock) = populated();
        let mut snapshot = controller.snapshot();
        snapshot.dials[0].weighted_votes += 1;
        assert!(matches!(
            EmissionsController::restore(snapshot, vec![], clock),
            Err(EmissionsError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn mismatched_params_are_rejected() {
        let (controller, clock) = populated();
        let mut snapshot = controller.snapshot();
        snapshot.params.total_epochs = 52;
        assert!(EmissionsController::restore(snapshot.clone(), vec![], clock.clone()).is_err());

        let mut snapshot = controller.snapshot();
        snapshot.epoch.total_epochs += 1;
        assert!(matches!(
            EmissionsController::restore(snapshot, vec![], clock.clone()),
            Err(EmissionsError::CorruptSnapshot(_))
        ));

        let mut snapshot = controller.snapshot();
        snapshot.epoch.total_reward_budget += 1;
        assert!(matches!(
            EmissionsController::restore(snapshot, vec![], clock.clone()),
            Err(EmissionsError::CorruptSnapshot(_))
        ));

        let mut snapshot = controller.snapshot();
        snapshot.version = 99;
        assert!(EmissionsController::restore(snapshot, vec![], clock).is_err());
    }
}
