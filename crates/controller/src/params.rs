use crate::errors::{EmissionsError, Result};
use emissions_types::{units, Amount, ONE_WEEK_SECS};
use serde::{Deserialize, Serialize};

/// What happens to an epoch's allotment when no dial holds any votes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroVotePolicy {
    /// The allotment is permanently foregone (fixed linear budget).
    #[default]
    Forfeit,
    /// The allotment is added on top of the next epoch that has votes.
    CarryForward,
}

/// What happens when a recipient rejects its share.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferFailurePolicy {
    /// Undo every credit made in the call and fail the whole epoch.
    AbortEpoch,
    /// Queue the failed share for a later retry and keep paying other dials.
    #[default]
    IsolateAndRetry,
}

/// Immutable configuration fixed when the controller is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmissionsParams {
    /// Pre-funded reward budget in base units
    #[serde(with = "emissions_types::amount_str")]
    pub total_reward_budget: Amount,
    /// Number of epochs the budget is released over
    pub total_epochs: u64,
    /// Minimum interval between distributions
    pub epoch_duration_secs: u64,
    pub zero_vote_policy: ZeroVotePolicy,
    pub transfer_failure_policy: TransferFailurePolicy,
}

impl Default for EmissionsParams {
    fn default() -> Self {
        // 40M tokens released weekly over six years
        Self {
            total_reward_budget: units(40_000_000),
            total_epochs: 312,
            epoch_duration_secs: ONE_WEEK_SECS,
            zero_vote_policy: ZeroVotePolicy::default(),
            transfer_failure_policy: TransferFailurePolicy::default(),
        }
    }
}

impl EmissionsParams {
    pub fn new(total_reward_budget: Amount, total_epochs: u64, epoch_duration_secs: u64) -> Self {
        Self {
            total_reward_budget,
            total_epochs,
            epoch_duration_secs,
            ..Self::default()
        }
    }

    pub fn with_zero_vote_policy(mut self, policy: ZeroVotePolicy) -> Self {
        self.zero_vote_policy = policy;
        self
    }

    pub fn with_transfer_failure_policy(mut self, policy: TransferFailurePolicy) -> Self {
        self.transfer_failure_policy = policy;
        self
    }

    /// Fixed per-epoch release: `floor(total_reward_budget / total_epochs)`.
    pub fn epoch_reward(&self) -> Amount {
        if self.total_epochs == 0 {
            return 0;
        }
        self.total_reward_budget / self.total_epochs as u128
    }

    pub fn validate(&self) -> Result<()> {
        if self.total_reward_budget == 0 {
            return Err(EmissionsError::InvalidParameter(
                "total_reward_budget must be positive".into(),
            ));
        }
        if self.total_epochs == 0 {
            return Err(EmissionsError::InvalidParameter(
                "total_epochs must be positive".into(),
            ));
        }
        if self.epoch_duration_secs == 0 {
            return Err(EmissionsError::InvalidParameter(
                "epoch_duration_secs must be positive".into(),
            ));
        }
        if self.epoch_reward() == 0 {
            return Err(EmissionsError::InvalidParameter(format!(
                "budget {} over {} epochs releases nothing per epoch",
                self.total_reward_budget, self.total_epochs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_epoch_reward_matches_linear_release() {
        let params = EmissionsParams::default();
        params.validate().unwrap();
        // 40,000,000 / 312 = 128,205.128205...
        assert_eq!(params.epoch_reward(), units(40_000_000) / 312);
        assert_eq!(params.epoch_reward() / units(1), 128_205);
    }

    #[test]
    fn rejects_degenerate_parameters() {
        assert!(EmissionsParams::new(0, 10, 60).validate().is_err());
        assert!(EmissionsParams::new(100, 0, 60).validate().is_err());
        assert!(EmissionsParams::new(100, 10, 0).validate().is_err());
        // 5 units over 10 epochs floors to zero per epoch
        assert!(EmissionsParams::new(5, 10, 60).validate().is_err());
    }

    #[test]
    fn policies_use_snake_case() {
        let params = EmissionsParams::default()
            .with_zero_vote_policy(ZeroVotePolicy::CarryForward)
            .with_transfer_failure_policy(TransferFailurePolicy::AbortEpoch);
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["zero_vote_policy"], "carry_forward");
        assert_eq!(json["transfer_failure_policy"], "abort_epoch");
        assert_eq!(json["total_reward_budget"], "40000000000000000000000000");
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let params: EmissionsParams =
            serde_json::from_str(r#"{ "total_epochs": 52 }"#).unwrap();
        assert_eq!(params.total_epochs, 52);
        assert_eq!(params.epoch_duration_secs, ONE_WEEK_SECS);
        assert_eq!(params.zero_vote_policy, ZeroVotePolicy::Forfeit);
    }
}
