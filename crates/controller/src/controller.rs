//! Emissions controller
//!
//! Owns all mutable engine state behind a single lock. Each mutating call
//! (`set_voter_weights`, `distribute_rewards`, dial administration) holds the
//! write lock for its whole duration and either commits completely or returns
//! an error with nothing changed.

use crate::aggregator::VoteAggregator;
use crate::allocation::{validate_entries, AllocationEntry, AllocationLedger, VoterAllocation};
use crate::dials::{Dial, DialRegistry};
use crate::distributor::{
    compute_shares, execute_transfers, DistributionReport, EpochState, PendingTransfer,
    RetryReport,
};
use crate::errors::{EmissionsError, Result};
use crate::events::{EmissionsEvent, EventLog};
use crate::params::{EmissionsParams, ZeroVotePolicy};
use crate::power_source::{total_power, VotingPowerSource};
use crate::reward_ledger::RewardLedger;
use emissions_types::{Amount, Clock, DialId, Power, RecipientId, Timestamp, VoterId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Everything the controller mutates.
#[derive(Debug)]
pub(crate) struct ControllerState {
    pub(crate) initialized: bool,
    pub(crate) dials: DialRegistry,
    pub(crate) allocations: AllocationLedger,
    pub(crate) votes: VoteAggregator,
    pub(crate) epoch: EpochState,
    pub(crate) pending: Vec<PendingTransfer>,
    pub(crate) events: EventLog,
}

impl ControllerState {
    pub(crate) fn new(epoch: EpochState) -> Self {
        Self {
            initialized: false,
            dials: DialRegistry::new(),
            allocations: AllocationLedger::new(),
            votes: VoteAggregator::default(),
            epoch,
            pending: Vec::new(),
            events: EventLog::default(),
        }
    }

    /// Recompute every dial total from the allocation table and compare.
    pub(crate) fn verify_conservation(&self) -> Result<()> {
        let mut expected: BTreeMap<DialId, Power> = BTreeMap::new();
        for allocation in self.allocations.iter() {
            for entry in &allocation.entries {
                if !self.dials.is_active(entry.dial) {
                    continue;
                }
                let votes = expected.entry(entry.dial).or_default();
                *votes = votes
                    .checked_add(entry.contribution(allocation.power_snapshot)?)
                    .ok_or(EmissionsError::ArithmeticOverflow("expected dial votes"))?;
            }
        }

        for dial in self.dials.iter() {
            let want = expected.get(&dial.id).copied().unwrap_or(0);
            if dial.weighted_votes != want {
                return Err(EmissionsError::InvariantViolation(format!(
                    "{} holds {} votes, allocations account for {}",
                    dial.id, dial.weighted_votes, want
                )));
            }
        }

        let active = self
            .dials
            .active_votes()
            .ok_or(EmissionsError::ArithmeticOverflow("active votes"))?;
        if active != self.votes.total_votes() {
            return Err(EmissionsError::InvariantViolation(format!(
                "grand total {} differs from dial sum {}",
                self.votes.total_votes(),
                active
            )));
        }
        Ok(())
    }
}

/// Epoch-based weighted reward distribution engine.
pub struct EmissionsController {
    params: EmissionsParams,
    sources: Vec<Arc<dyn VotingPowerSource>>,
    clock: Arc<dyn Clock>,
    pub(crate) state: RwLock<ControllerState>,
}

impl std::fmt::Debug for EmissionsController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmissionsController")
            .field("params", &self.params)
            .field("sources", &self.sources.len())
            .finish_non_exhaustive()
    }
}

impl EmissionsController {
    /// Create a controller whose first epoch starts now.
    pub fn new(
        params: EmissionsParams,
        sources: Vec<Arc<dyn VotingPowerSource>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        params.validate()?;
        let bootstrap = clock.now_secs();
        let state = ControllerState::new(EpochState::new(&params, bootstrap));
        info!(
            target: "emissions",
            budget = params.total_reward_budget,
            epochs = params.total_epochs,
            epoch_reward = params.epoch_reward(),
            bootstrap,
            "emissions controller created"
        );
        Ok(Self {
            params,
            sources,
            clock,
            state: RwLock::new(state),
        })
    }

    pub(crate) fn from_parts(
        params: EmissionsParams,
        sources: Vec<Arc<dyn VotingPowerSource>>,
        clock: Arc<dyn Clock>,
        state: ControllerState,
    ) -> Self {
        Self {
            params,
            sources,
            clock,
            state: RwLock::new(state),
        }
    }

    // =========================================================================
    // DIAL ADMINISTRATION
    // =========================================================================

    /// Register the initial dial set. Allowed exactly once.
    pub fn initialize(&self, recipients: &[RecipientId]) -> Result<Vec<DialId>> {
        let mut state = self.state.write();
        if state.initialized {
            return Err(EmissionsError::AlreadyInitialized);
        }

        // Register into a scratch copy so a duplicate leaves nothing behind.
        let mut dials = state.dials.clone();
        let ids = recipients
            .iter()
            .map(|recipient| dials.register(*recipient))
            .collect::<Result<Vec<_>>>()?;

        state.dials = dials;
        state.initialized = true;
        for (id, recipient) in ids.iter().zip(recipients) {
            state.events.push(EmissionsEvent::DialAdded {
                dial: *id,
                recipient: *recipient,
            });
        }
        info!(target: "emissions", dials = ids.len(), "dial registry initialized");
        Ok(ids)
    }

    /// Add a dial after initialization. No voter allocates to it until they
    /// resubmit with it included.
    pub fn add_dial(&self, recipient: RecipientId) -> Result<DialId> {
        let mut state = self.state.write();
        let id = state.dials.register(recipient)?;
        state.events.push(EmissionsEvent::DialAdded {
            dial: id,
            recipient,
        });
        info!(target: "emissions", dial = %id, %recipient, "dial added");
        Ok(id)
    }

    /// Permanently stop a dial from receiving votes or rewards.
    pub fn disable_dial(&self, dial: DialId) -> Result<()> {
        let mut state = self.state.write();
        let removed = state.dials.ensure_active(dial)?.weighted_votes;
        let mut votes = state.votes;
        votes.forget_dial(removed)?;

        state.dials.disable(dial)?;
        state.votes = votes;
        state.events.push(EmissionsEvent::DialDisabled { dial });
        info!(target: "emissions", dial = %dial, removed_votes = removed, "dial disabled");
        Ok(())
    }

    // =========================================================================
    // ALLOCATION
    // =========================================================================

    /// Replace `voter`'s allocation with `entries`.
    ///
    /// The voter's power is read from every source once, here, and stored as
    /// the snapshot the new entries are weighted with. An empty list withdraws
    /// all of the voter's weight.
    pub fn set_voter_weights(&self, voter: VoterId, entries: Vec<AllocationEntry>) -> Result<()> {
        let now = self.clock.now_secs();
        let mut state = self.state.write();
        let state = &mut *state;

        validate_entries(&entries, &state.dials)?;
        let power = total_power(&self.sources, &voter, Some(now))?;

        let (previous, previous_power) = match state.allocations.get(&voter) {
            Some(existing) => (existing.entries.clone(), existing.power_snapshot),
            None => (Vec::new(), 0),
        };

        let mut votes = state.votes;
        votes.reallocate(&mut state.dials, &previous, previous_power, &entries, power)?;
        state.votes = votes;

        let entry_count = entries.len();
        state.allocations.replace(VoterAllocation {
            voter,
            entries,
            power_snapshot: power,
            updated_at: now,
        });
        state.events.push(EmissionsEvent::AllocationChanged { voter });

        info!(
            target: "emissions",
            %voter,
            power,
            entries = entry_count,
            total_votes = state.votes.total_votes(),
            "voter allocation updated"
        );
        Ok(())
    }

    // =========================================================================
    // DISTRIBUTION
    // =========================================================================

    /// Release this epoch's rewards to dials in proportion to their votes.
    ///
    /// Permissionless; calls inside the same epoch fail with `TooEarly`.
    pub fn distribute_rewards(&self, ledger: &mut dyn RewardLedger) -> Result<DistributionReport> {
        let now = self.clock.now_secs();
        let mut state = self.state.write();
        let state = &mut *state;

        let epoch = state.epoch.clone();
        epoch.check_ready(now)?;
        let epoch_index = epoch.epochs_processed;
        let pot = epoch.pot()?;
        let total_votes = state.votes.total_votes();
        let mut next = epoch;
        next.last_distribution_time = now;
        next.epochs_processed += 1;

        if total_votes == 0 {
            let (forfeited, carried) = match self.params.zero_vote_policy {
                ZeroVotePolicy::Forfeit => (pot, 0),
                ZeroVotePolicy::CarryForward => (0, pot),
            };
            next.carried_over = carried;
            next.total_forfeited = next
                .total_forfeited
                .checked_add(forfeited)
                .ok_or(EmissionsError::ArithmeticOverflow("forfeited total"))?;
            state.epoch = next;
            warn!(
                target: "emissions",
                epoch = epoch_index,
                forfeited,
                carried,
                "no dial votes, epoch skipped"
            );
            return Ok(DistributionReport {
                epoch_index,
                timestamp: now,
                pot,
                total_votes,
                payouts: Vec::new(),
                total_distributed: 0,
                residue: 0,
                carried_over: carried,
                forfeited,
                deferred: Vec::new(),
            });
        }

        let shares = compute_shares(state.dials.as_slice(), total_votes, pot)?;
        let allotted: Amount = shares.iter().map(|p| p.amount).sum();
        let residue = pot.saturating_sub(allotted);

        let outcome = execute_transfers(
            shares,
            epoch_index,
            self.params.transfer_failure_policy,
            ledger,
        )?;

        // Ledger side is settled; commit controller state.
        let paid_total: Amount = outcome.paid.iter().map(|p| p.amount).sum();
        for payout in &outcome.paid {
            credit_dial(state, payout.dial, payout.amount);
            state.events.push(EmissionsEvent::DistributedReward {
                dial: payout.dial,
                recipient: payout.recipient,
                amount: payout.amount,
                epoch_index,
            });
        }
        for deferred in &outcome.deferred {
            state.events.push(EmissionsEvent::TransferDeferred {
                dial: deferred.dial,
                amount: deferred.amount,
                epoch_index,
            });
        }
        state.pending.extend(outcome.deferred.iter().cloned());

        next.carried_over = 0;
        next.total_distributed = next.total_distributed.saturating_add(paid_total);
        next.total_residue = next.total_residue.saturating_add(residue);
        state.epoch = next;

        info!(
            target: "emissions",
            epoch = epoch_index,
            pot,
            total_votes,
            total_distributed = paid_total,
            residue,
            payouts = outcome.paid.len(),
            deferred = outcome.deferred.len(),
            "epoch rewards distributed"
        );

        Ok(DistributionReport {
            epoch_index,
            timestamp: now,
            pot,
            total_votes,
            payouts: outcome.paid,
            total_distributed: paid_total,
            residue,
            carried_over: 0,
            forfeited: 0,
            deferred: outcome.deferred,
        })
    }

    /// Re-attempt every queued transfer once. Failures stay queued.
    pub fn retry_pending_transfers(&self, ledger: &mut dyn RewardLedger) -> Result<RetryReport> {
        let mut state = self.state.write();
        let state = &mut *state;
        let mut report = RetryReport::default();

        for mut transfer in std::mem::take(&mut state.pending) {
            match ledger.credit(&transfer.recipient, transfer.amount) {
                Ok(()) => {
                    credit_dial(state, transfer.dial, transfer.amount);
                    state.epoch.total_distributed =
                        state.epoch.total_distributed.saturating_add(transfer.amount);
                    state.events.push(EmissionsEvent::DistributedReward {
                        dial: transfer.dial,
                        recipient: transfer.recipient,
                        amount: transfer.amount,
                        epoch_index: transfer.epoch_index,
                    });
                    report.settled.push(transfer);
                }
                Err(err) => {
                    transfer.attempts = transfer.attempts.saturating_add(1);
                    transfer.last_error = format!("{err:#}");
                    report.still_pending.push(transfer);
                }
            }
        }
        state.pending = report.still_pending.clone();

        info!(
            target: "emissions",
            settled = report.settled.len(),
            still_pending = report.still_pending.len(),
            "pending transfers retried"
        );
        Ok(report)
    }

    // =========================================================================
    // VIEWS
    // =========================================================================

    pub fn params(&self) -> &EmissionsParams {
        &self.params
    }

    pub fn epoch_reward(&self) -> Amount {
        self.params.epoch_reward()
    }

    /// Grand total of weighted votes over enabled dials.
    pub fn total_dial_votes(&self) -> Power {
        self.state.read().votes.total_votes()
    }

    pub fn dial(&self, id: DialId) -> Option<Dial> {
        self.state.read().dials.get(id).cloned()
    }

    pub fn dial_votes(&self, id: DialId) -> Option<Power> {
        self.state.read().dials.get(id).map(|d| d.weighted_votes)
    }

    pub fn dials(&self) -> Vec<Dial> {
        self.state.read().dials.as_slice().to_vec()
    }

    pub fn voter_allocation(&self, voter: &VoterId) -> Option<VoterAllocation> {
        self.state.read().allocations.get(voter).cloned()
    }

    pub fn voter_count(&self) -> usize {
        self.state.read().allocations.len()
    }

    pub fn epoch_state(&self) -> EpochState {
        self.state.read().epoch.clone()
    }

    pub fn next_distribution_at(&self) -> Timestamp {
        self.state.read().epoch.next_distribution_at()
    }

    pub fn can_distribute(&self) -> bool {
        self.state.read().epoch.can_distribute(self.clock.now_secs())
    }

    pub fn pending_transfers(&self) -> Vec<PendingTransfer> {
        self.state.read().pending.clone()
    }

    /// Hand over all events recorded since the last drain.
    ///
    /// Call this regularly: an undrained log keeps only the most recent
    /// `MAX_BUFFERED_EVENTS` entries.
    pub fn drain_events(&self) -> Vec<EmissionsEvent> {
        self.state.write().events.drain()
    }

    /// Recompute the vote conservation identity from scratch.
    pub fn check_invariants(&self) -> Result<()> {
        self.state.read().verify_conservation()
    }
}

fn credit_dial(state: &mut ControllerState, dial: DialId, amount: Amount) {
    if let Some(d) = state.dials.get_mut(dial) {
        d.cumulative_distributed = d.cumulative_distributed.saturating_add(amount);
    }
}
