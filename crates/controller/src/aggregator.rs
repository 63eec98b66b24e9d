//! Vote aggregator
//!
//! Keeps each dial's weighted-vote total current by diffing a voter's old
//! allocation against the new one. Cost is proportional to the voter's own
//! entries; the voter population is never rescanned.

use crate::allocation::AllocationEntry;
use crate::dials::DialRegistry;
use crate::errors::{EmissionsError, Result};
use emissions_types::{DialId, Power};
use std::collections::BTreeMap;
use tracing::debug;

/// Running grand total of weighted votes across enabled dials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoteAggregator {
    total_votes: Power,
}

impl VoteAggregator {
    pub fn new(total_votes: Power) -> Self {
        Self { total_votes }
    }

    pub fn total_votes(&self) -> Power {
        self.total_votes
    }

    /// Remove a disabled dial's votes from the grand total.
    pub fn forget_dial(&mut self, votes: Power) -> Result<()> {
        self.total_votes = self
            .total_votes
            .checked_sub(votes)
            .ok_or(EmissionsError::ArithmeticOverflow("grand total underflow"))?;
        Ok(())
    }

    /// Swap a voter's contribution from `(previous, previous_power)` to
    /// `(next, next_power)`.
    ///
    /// Previous entries are subtracted with the snapshot they were added with.
    /// Entries pointing at a dial disabled since then are skipped: that dial's
    /// total was already zeroed. All arithmetic is staged first, so an error
    /// leaves the registry untouched.
    pub fn reallocate(
        &mut self,
        registry: &mut DialRegistry,
        previous: &[AllocationEntry],
        previous_power: Power,
        next: &[AllocationEntry],
        next_power: Power,
    ) -> Result<()> {
        let mut staged: BTreeMap<DialId, Power> = BTreeMap::new();
        let mut total = self.total_votes;

        for entry in previous {
            let Some(dial) = registry.get(entry.dial).filter(|d| d.enabled) else {
                continue;
            };
            let contribution = entry.contribution(previous_power)?;
            let votes = staged.entry(entry.dial).or_insert(dial.weighted_votes);
            *votes = votes
                .checked_sub(contribution)
                .ok_or(EmissionsError::ArithmeticOverflow("dial votes underflow"))?;
            total = total
                .checked_sub(contribution)
                .ok_or(EmissionsError::ArithmeticOverflow("grand total underflow"))?;
        }

        for entry in next {
            let dial = registry.ensure_active(entry.dial)?;
            let contribution = entry.contribution(next_power)?;
            let votes = staged.entry(entry.dial).or_insert(dial.weighted_votes);
            *votes = votes
                .checked_add(contribution)
                .ok_or(EmissionsError::ArithmeticOverflow("dial votes overflow"))?;
            total = total
                .checked_add(contribution)
                .ok_or(EmissionsError::ArithmeticOverflow("grand total overflow"))?;
        }

        for (id, votes) in staged {
            if let Some(dial) = registry.get_mut(id) {
                debug!(target: "emissions", dial = %id, votes, "dial votes updated");
                dial.weighted_votes = votes;
            }
        }
        self.total_votes = total;
        Ok(())
    }
}
