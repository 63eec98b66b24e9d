//! Audit events emitted by the controller.

use emissions_types::{Amount, DialId, RecipientId, VoterId};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EmissionsEvent {
    DialAdded {
        dial: DialId,
        recipient: RecipientId,
    },
    DialDisabled {
        dial: DialId,
    },
    /// A voter successfully replaced their allocation
    AllocationChanged {
        voter: VoterId,
    },
    /// A non-zero payout reached its recipient
    DistributedReward {
        dial: DialId,
        recipient: RecipientId,
        #[serde(with = "emissions_types::amount_str")]
        amount: Amount,
        epoch_index: u64,
    },
    /// A payout was rejected and queued for retry
    TransferDeferred {
        dial: DialId,
        #[serde(with = "emissions_types::amount_str")]
        amount: Amount,
        epoch_index: u64,
    },
}

/// Events kept before the oldest are discarded.
pub const MAX_BUFFERED_EVENTS: usize = 10_000;

/// Events discarded at once when the buffer overflows.
const EVICTION_BATCH: usize = 1_000;

/// Buffer of events awaiting collection.
///
/// Callers are expected to `drain` it regularly. A log left undrained keeps only
/// the most recent `MAX_BUFFERED_EVENTS` entries.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<EmissionsEvent>,
    dropped: u64,
}

impl EventLog {
    pub fn push(&mut self, event: EmissionsEvent) {
        self.events.push(event);

        if self.events.len() > MAX_BUFFERED_EVENTS {
            self.events.drain(0..EVICTION_BATCH);
            self.dropped = self.dropped.saturating_add(EVICTION_BATCH as u64);
            warn!(
                target: "emissions",
                dropped = self.dropped,
                "event log not drained, oldest events discarded"
            );
        }
    }

    /// Events discarded because the log was not drained in time.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn drain(&mut self) -> Vec<EmissionsEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
