//! Emissions Controller
//!
//! Splits a fixed, pre-funded reward budget across a dynamic set of dials once
//! per epoch, in proportion to the voting power voters delegate to each dial.
//!
//! Flow: a voter replaces their allocation (`set_voter_weights`), the vote
//! aggregator diffs old against new and updates dial totals, and later anyone
//! calls `distribute_rewards` to pay out the epoch.

pub mod aggregator;
pub mod allocation;
pub mod controller;
pub mod dials;
pub mod distributor;
pub mod errors;
pub mod events;
pub mod params;
pub mod power_source;
pub mod reward_ledger;
pub mod snapshot;

pub use allocation::{AllocationEntry, VoterAllocation};
pub use controller::EmissionsController;
pub use dials::Dial;
pub use distributor::{DistributionReport, EpochState, Payout, PendingTransfer, RetryReport};
pub use errors::{EmissionsError, Result};
pub use events::EmissionsEvent;
pub use params::{EmissionsParams, TransferFailurePolicy, ZeroVotePolicy};
pub use power_source::{StaticPowerSource, VotingPowerSource};
pub use reward_ledger::{InMemoryRewardLedger, MockRewardLedger, RewardLedger};
pub use snapshot::ControllerSnapshot;
