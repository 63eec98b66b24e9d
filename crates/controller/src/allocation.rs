//! Allocation ledger
//!
//! Per-voter record of how the voter's power is split across dials. A voter's
//! allocation is always replaced wholesale, never merged.

use crate::dials::DialRegistry;
use crate::errors::{EmissionsError, Result};
use emissions_types::{
    apply_fraction, DialId, Fraction, Power, Timestamp, VoterId, FIXED_POINT_SCALE,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One `(dial, fraction)` pair of a voter's allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub dial: DialId,
    /// Share of the voter's power, `FIXED_POINT_SCALE` == 100%
    #[serde(with = "emissions_types::amount_str")]
    pub fraction: Fraction,
}

impl AllocationEntry {
    pub fn new(dial: DialId, fraction: Fraction) -> Self {
        Self { dial, fraction }
    }

    /// Weighted votes this entry adds to its dial for a voter with `power`.
    pub fn contribution(&self, power: Power) -> Result<Power> {
        apply_fraction(power, self.fraction)
            .ok_or(EmissionsError::ArithmeticOverflow("weighted vote contribution"))
    }
}

/// A voter's current allocation and the power it was computed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterAllocation {
    pub voter: VoterId,
    pub entries: Vec<AllocationEntry>,
    /// Summed source power at the moment the allocation was last set
    #[serde(with = "emissions_types::amount_str")]
    pub power_snapshot: Power,
    pub updated_at: Timestamp,
}

impl VoterAllocation {
    /// Total fraction allocated, `FIXED_POINT_SCALE` == everything.
    pub fn allocated_fraction(&self) -> Fraction {
        self.entries.iter().map(|e| e.fraction).sum()
    }

    /// The voter's power currently pointed at dials.
    pub fn allocated_votes(&self) -> Result<Power> {
        self.entries.iter().try_fold(0u128, |acc, entry| {
            acc.checked_add(entry.contribution(self.power_snapshot)?)
                .ok_or(EmissionsError::ArithmeticOverflow("allocated votes"))
        })
    }
}

/// Check a submitted entry list against the registry.
///
/// Shape problems (duplicates, over-allocation) are reported before dial
/// lookups so a malformed list never depends on registry contents.
pub fn validate_entries(entries: &[AllocationEntry], registry: &DialRegistry) -> Result<()> {
    let mut seen = HashSet::with_capacity(entries.len());
    let mut total: Fraction = 0;

    for entry in entries {
        if !seen.insert(entry.dial) {
            return Err(EmissionsError::InvalidAllocation(format!(
                "{} listed more than once",
                entry.dial
            )));
        }
        total = total
            .checked_add(entry.fraction)
            .filter(|t| *t <= FIXED_POINT_SCALE)
            .ok_or_else(|| {
                EmissionsError::InvalidAllocation(
                    "fractions add up to more than 100%".to_string(),
                )
            })?;
    }

    for entry in entries {
        registry.ensure_active(entry.dial)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct AllocationLedger {
    voters: HashMap<VoterId, VoterAllocation>,
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_allocations(allocations: Vec<VoterAllocation>) -> Result<Self> {
        let mut voters = HashMap::with_capacity(allocations.len());
        for allocation in allocations {
            let voter = allocation.voter;
            if voters.insert(voter, allocation).is_some() {
                return Err(EmissionsError::CorruptSnapshot(format!(
                    "voter {voter} stored twice"
                )));
            }
        }
        Ok(Self { voters })
    }

    pub fn get(&self, voter: &VoterId) -> Option<&VoterAllocation> {
        self.voters.get(voter)
    }

    /// Store `allocation`, handing back the one it replaces.
    pub fn replace(&mut self, allocation: VoterAllocation) -> Option<VoterAllocation> {
        self.voters.insert(allocation.voter, allocation)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VoterAllocation> {
        self.voters.values()
    }

    /// Allocations ordered by voter, for stable persistence.
    pub fn sorted(&self) -> Vec<VoterAllocation> {
        let mut all: Vec<_> = self.voters.values().cloned().collect();
        all.sort_by_key(|a| a.voter);
        all
    }

    pub fn len(&self) -> usize {
        self.voters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voters.is_empty()
    }
}
