//! Epoch distributor
//!
//! Gates reward release to a fixed cadence and splits each epoch's pot across
//! enabled dials in proportion to their weighted votes.
//!
//! ## Key Invariants
//! - At most one distribution per `epoch_duration_secs`; the timestamp check is the only guard
//! - `share(d) = floor(pot × votes(d) / total_votes)`, so `sum(shares) <= pot`
//! - Rounding residue is never redistributed
//! - Under `AbortEpoch` a rejected transfer unwinds every credit made in the same call;
//!   credits the ledger will not reverse surface as `IncompleteUnwind`

use crate::dials::Dial;
use crate::errors::{EmissionsError, Result};
use crate::params::{EmissionsParams, TransferFailurePolicy};
use crate::reward_ledger::RewardLedger;
use emissions_types::{mul_div_floor, Amount, DialId, Power, RecipientId, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

// =============================================================================
// EPOCH STATE
// =============================================================================

/// Scalar release schedule state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochState {
    #[serde(with = "emissions_types::amount_str")]
    pub total_reward_budget: Amount,
    pub total_epochs: u64,
    /// `floor(total_reward_budget / total_epochs)`, fixed for life
    #[serde(with = "emissions_types::amount_str")]
    pub epoch_reward: Amount,
    pub epoch_duration_secs: u64,
    pub last_distribution_time: Timestamp,
    /// Distributions completed so far (including zero-vote epochs)
    pub epochs_processed: u64,
    /// Allotments waiting for an epoch with votes (carry-forward policy only)
    #[serde(with = "emissions_types::amount_str")]
    pub carried_over: Amount,
    #[serde(with = "emissions_types::amount_str")]
    pub total_distributed: Amount,
    #[serde(with = "emissions_types::amount_str")]
    pub total_forfeited: Amount,
    #[serde(with = "emissions_types::amount_str")]
    pub total_residue: Amount,
}

impl EpochState {
    pub fn new(params: &EmissionsParams, bootstrap_time: Timestamp) -> Self {
        Self {
            total_reward_budget: params.total_reward_budget,
            total_epochs: params.total_epochs,
            epoch_reward: params.epoch_reward(),
            epoch_duration_secs: params.epoch_duration_secs,
            last_distribution_time: bootstrap_time,
            epochs_processed: 0,
            carried_over: 0,
            total_distributed: 0,
            total_forfeited: 0,
            total_residue: 0,
        }
    }

    pub fn next_distribution_at(&self) -> Timestamp {
        self.last_distribution_time
            .saturating_add(self.epoch_duration_secs)
    }

    pub fn remaining_epochs(&self) -> u64 {
        self.total_epochs.saturating_sub(self.epochs_processed)
    }

    pub fn can_distribute(&self, now: Timestamp) -> bool {
        self.check_ready(now).is_ok()
    }

    /// Fail unless a distribution may run at `now`.
    pub fn check_ready(&self, now: Timestamp) -> Result<()> {
        if self.remaining_epochs() == 0 {
            return Err(EmissionsError::BudgetExhausted {
                epochs: self.epochs_processed,
            });
        }
        // A clock behind the last distribution reads as zero elapsed.
        if now.saturating_sub(self.last_distribution_time) < self.epoch_duration_secs {
            return Err(EmissionsError::TooEarly {
                now,
                next_allowed: self.next_distribution_at(),
            });
        }
        Ok(())
    }

    /// This epoch's pot: the fixed allotment plus anything carried over.
    pub fn pot(&self) -> Result<Amount> {
        self.epoch_reward
            .checked_add(self.carried_over)
            .ok_or(EmissionsError::ArithmeticOverflow("epoch pot"))
    }
}

// =============================================================================
// SHARE COMPUTATION
// =============================================================================

/// A single dial's share of one epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub dial: DialId,
    pub recipient: RecipientId,
    #[serde(with = "emissions_types::amount_str")]
    pub amount: Amount,
    /// Weighted votes the share was computed from
    #[serde(with = "emissions_types::amount_str")]
    pub weighted_votes: Power,
}

/// Compute every enabled dial's share of `pot`, in registry order.
///
/// Dials without votes, or whose share floors to zero, are left out entirely.
pub fn compute_shares(dials: &[Dial], total_votes: Power, pot: Amount) -> Result<Vec<Payout>> {
    if total_votes == 0 {
        return Ok(Vec::new());
    }
    let mut payouts = Vec::new();
    for dial in dials.iter().filter(|d| d.enabled && d.weighted_votes > 0) {
        let amount = mul_div_floor(pot, dial.weighted_votes, total_votes)
            .ok_or(EmissionsError::ArithmeticOverflow("dial share"))?;
        if amount == 0 {
            continue;
        }
        payouts.push(Payout {
            dial: dial.id,
            recipient: dial.recipient,
            amount,
            weighted_votes: dial.weighted_votes,
        });
    }
    Ok(payouts)
}

// =============================================================================
// TRANSFERS
// =============================================================================

/// A share a recipient rejected, waiting to be retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransfer {
    pub dial: DialId,
    pub recipient: RecipientId,
    #[serde(with = "emissions_types::amount_str")]
    pub amount: Amount,
    pub epoch_index: u64,
    pub attempts: u32,
    pub last_error: String,
}

/// What actually happened to an epoch's payouts.
#[derive(Debug, Clone, Default)]
pub struct TransferOutcome {
    pub paid: Vec<Payout>,
    pub deferred: Vec<PendingTransfer>,
}

/// Credit every payout on `ledger` according to `policy`.
///
/// On `AbortEpoch` the first rejection debits back all earlier credits of this
/// call (newest first) before the error is returned. Credits the ledger refuses
/// to reverse are returned in `IncompleteUnwind` for the caller to reconcile.
pub fn execute_transfers(
    payouts: Vec<Payout>,
    epoch_index: u64,
    policy: TransferFailurePolicy,
    ledger: &mut dyn RewardLedger,
) -> Result<TransferOutcome> {
    let mut outcome = TransferOutcome::default();

    for payout in payouts {
        match ledger.credit(&payout.recipient, payout.amount) {
            Ok(()) => {
                debug!(
                    target: "emissions",
                    dial = %payout.dial,
                    amount = payout.amount,
                    "dial credited"
                );
                outcome.paid.push(payout);
            }
            Err(err) => match policy {
                TransferFailurePolicy::AbortEpoch => {
                    let reason = format!("{err:#}");
                    let unreversed = unwind(&outcome.paid, ledger);
                    if !unreversed.is_empty() {
                        return Err(EmissionsError::IncompleteUnwind {
                            dial: payout.dial,
                            reason,
                            unreversed,
                        });
                    }
                    return Err(EmissionsError::RecipientTransferFailure {
                        dial: payout.dial,
                        reason,
                    });
                }
                TransferFailurePolicy::IsolateAndRetry => {
                    warn!(
                        target: "emissions",
                        dial = %payout.dial,
                        amount = payout.amount,
                        error = %err,
                        "transfer rejected, queued for retry"
                    );
                    outcome.deferred.push(PendingTransfer {
                        dial: payout.dial,
                        recipient: payout.recipient,
                        amount: payout.amount,
                        epoch_index,
                        attempts: 1,
                        last_error: format!("{err:#}"),
                    });
                }
            },
        }
    }
    Ok(outcome)
}

/// Debit back `paid`, newest first. Returns the credits that could not be reversed.
fn unwind(paid: &[Payout], ledger: &mut dyn RewardLedger) -> Vec<(DialId, Amount)> {
    let mut unreversed = Vec::new();
    for payout in paid.iter().rev() {
        if let Err(err) = ledger.debit(&payout.recipient, payout.amount) {
            error!(
                target: "emissions",
                dial = %payout.dial,
                amount = payout.amount,
                error = %err,
                "failed to unwind credit of aborted epoch"
            );
            unreversed.push((payout.dial, payout.amount));
        }
    }
    unreversed
}

// =============================================================================
// REPORTS
// =============================================================================

/// Result of a `distribute_rewards` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionReport {
    /// Zero-based index of the epoch just closed
    pub epoch_index: u64,
    pub timestamp: Timestamp,
    /// Amount available this epoch (allotment + carried)
    #[serde(with = "emissions_types::amount_str")]
    pub pot: Amount,
    #[serde(with = "emissions_types::amount_str")]
    pub total_votes: Power,
    /// Payouts that reached their recipients
    pub payouts: Vec<Payout>,
    #[serde(with = "emissions_types::amount_str")]
    pub total_distributed: Amount,
    /// Floor-division leftover, not redistributed
    #[serde(with = "emissions_types::amount_str")]
    pub residue: Amount,
    /// Pot moved to the next epoch (zero-vote epoch under carry-forward)
    #[serde(with = "emissions_types::amount_str")]
    pub carried_over: Amount,
    /// Pot given up (zero-vote epoch under forfeit)
    #[serde(with = "emissions_types::amount_str")]
    pub forfeited: Amount,
    /// Payouts queued for retry
    pub deferred: Vec<PendingTransfer>,
}

/// Result of a `retry_pending_transfers` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryReport {
    pub settled: Vec<PendingTransfer>,
    pub still_pending: Vec<PendingTransfer>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reward_ledger::MockRewardLedger;
    use emissions_types::units;

    fn dial(id: u32, votes: Power) -> Dial {
        Dial {
            id: DialId(id),
            recipient: RecipientId([id as u8 + 1; 32]),
            weighted_votes: votes,
            enabled: true,
            cumulative_distributed: 0,
        }
    }

    fn state() -> EpochState {
        EpochState::new(&EmissionsParams::new(1_000, 10, 60), 1_000)
    }

    #[test]
    fn cadence_gate() {
        let state = state();
        assert_eq!(state.epoch_reward, 100);
        assert_eq!(state.next_distribution_at(), 1_060);
        assert!(matches!(
            state.check_ready(1_059),
            Err(EmissionsError::TooEarly {
                now: 1_059,
                next_allowed: 1_060
            })
        ));
        assert!(state.check_ready(1_060).is_ok());
        assert!(!state.can_distribute(10));
    }

    #[test]
    fn exhausted_budget_blocks_distribution() {
        let mut state = state();
        state.epochs_processed = 10;
        assert!(matches!(
            state.check_ready(u64::MAX),
            Err(EmissionsError::BudgetExhausted { epochs: 10 })
        ));
    }

    #[test]
    fn shares_floor_and_skip_empty_dials() {
        let dials = [dial(0, 1), dial(1, 0), dial(2, 2)];
        let payouts = compute_shares(&dials, 3, 100).unwrap();
        assert_eq!(payouts.len(), 2);
        assert_eq!(payouts[0].amount, 33);
        assert_eq!(payouts[1].dial, DialId(2));
        assert_eq!(payouts[1].amount, 66);
    }

    #[test]
    fn shares_skip_disabled_dials_and_zero_totals() {
        let mut disabled = dial(0, 5);
        disabled.enabled = false;
        let dials = [disabled, dial(1, 5)];
        let payouts = compute_shares(&dials, 5, 100).unwrap();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].amount, 100);
        assert!(compute_shares(&dials, 0, 100).unwrap().is_empty());
    }

    #[test]
    fn shares_use_wide_arithmetic() {
        let pot = units(40_000_000) / 312;
        let dials = [dial(0, units(300)), dial(1, units(600))];
        let payouts = compute_shares(&dials, units(900), pot).unwrap();
        assert_eq!(payouts[0].amount, pot / 3);
        assert_eq!(payouts[1].amount, pot * 2 / 3);
    }

    #[test]
    fn abort_policy_unwinds_earlier_credits() {
        let dials = [dial(0, 1), dial(1, 1), dial(2, 1)];
        let payouts = compute_shares(&dials, 3, 99).unwrap();
        let mut ledger = MockRewardLedger::new();
        ledger.reject(RecipientId([3; 32]));

        let err = execute_transfers(payouts, 0, TransferFailurePolicy::AbortEpoch, &mut ledger)
            .unwrap_err();
        assert!(matches!(
            err,
            EmissionsError::RecipientTransferFailure { dial: DialId(2), .. }
        ));
        assert_eq!(ledger.total_credited(), 0);
        assert_eq!(ledger.get_debit_calls().len(), 2);
        assert_eq!(ledger.get_debit_calls()[0].0, RecipientId([2; 32]));
    }

    #[test]
    fn failed_unwind_reports_stranded_credits() {
        let dials = [dial(0, 1), dial(1, 1), dial(2, 1)];
        let payouts = compute_shares(&dials, 3, 99).unwrap();
        let mut ledger = MockRewardLedger::new();
        ledger.reject(RecipientId([3; 32]));
        ledger.reject_debits(RecipientId([1; 32]));

        let err = execute_transfers(payouts, 0, TransferFailurePolicy::AbortEpoch, &mut ledger)
            .unwrap_err();
        match err {
            EmissionsError::IncompleteUnwind {
                dial, unreversed, ..
            } => {
                assert_eq!(dial, DialId(2));
                assert_eq!(unreversed, vec![(DialId(0), 33)]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ledger.balance_of(&RecipientId([1; 32])), 33);
        assert_eq!(ledger.balance_of(&RecipientId([2; 32])), 0);
    }

    #[test]
    fn isolate_policy_defers_failed_share() {
        let dials = [dial(0, 1), dial(1, 1)];
        let payouts = compute_shares(&dials, 2, 100).unwrap();
        let mut ledger = MockRewardLedger::new();
        ledger.reject(RecipientId([1; 32]));

        let outcome =
            execute_transfers(payouts, 4, TransferFailurePolicy::IsolateAndRetry, &mut ledger)
                .unwrap();
        assert_eq!(outcome.paid.len(), 1);
        assert_eq!(outcome.paid[0].dial, DialId(1));
        assert_eq!(outcome.deferred.len(), 1);
        assert_eq!(outcome.deferred[0].dial, DialId(0));
        assert_eq!(outcome.deferred[0].epoch_index, 4);
        assert_eq!(outcome.deferred[0].attempts, 1);
        assert_eq!(ledger.total_credited(), 50);
    }
}
