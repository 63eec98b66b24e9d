//! Dial registry
//!
//! Dials are stored in registration order and never removed; `DialId` is the
//! index into the table. Disabling keeps the row (and its payout history) but
//! zeroes its weighted votes for good.

use crate::errors::{EmissionsError, Result};
use emissions_types::{Amount, DialId, Power, RecipientId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A registered payee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dial {
    pub id: DialId,
    pub recipient: RecipientId,
    /// Sum of `power × fraction` over every voter currently allocating here
    #[serde(with = "emissions_types::amount_str")]
    pub weighted_votes: Power,
    pub enabled: bool,
    /// Lifetime rewards received (monotonic)
    #[serde(with = "emissions_types::amount_str")]
    pub cumulative_distributed: Amount,
}

impl Dial {
    fn new(id: DialId, recipient: RecipientId) -> Self {
        Self {
            id,
            recipient,
            weighted_votes: 0,
            enabled: true,
            cumulative_distributed: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DialRegistry {
    dials: Vec<Dial>,
}

impl DialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from a persisted dial table.
    pub fn from_dials(dials: Vec<Dial>) -> Result<Self> {
        let mut recipients = HashSet::new();
        for (index, dial) in dials.iter().enumerate() {
            if dial.id.index() != index {
                return Err(EmissionsError::CorruptSnapshot(format!(
                    "{} stored at position {index}",
                    dial.id
                )));
            }
            if !recipients.insert(dial.recipient) {
                return Err(EmissionsError::DuplicateDial(dial.recipient));
            }
            if !dial.enabled && dial.weighted_votes != 0 {
                return Err(EmissionsError::CorruptSnapshot(format!(
                    "disabled {} still carries votes",
                    dial.id
                )));
            }
        }
        Ok(Self { dials })
    }

    /// Append a new enabled dial and return its id.
    pub fn register(&mut self, recipient: RecipientId) -> Result<DialId> {
        if self.dials.iter().any(|d| d.recipient == recipient) {
            return Err(EmissionsError::DuplicateDial(recipient));
        }
        let id = u32::try_from(self.dials.len())
            .map(DialId)
            .map_err(|_| EmissionsError::InvalidParameter("dial registry is full".into()))?;
        self.dials.push(Dial::new(id, recipient));
        Ok(id)
    }

    pub fn get(&self, id: DialId) -> Option<&Dial> {
        self.dials.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: DialId) -> Option<&mut Dial> {
        self.dials.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Dial> {
        self.dials.iter()
    }

    pub fn as_slice(&self) -> &[Dial] {
        &self.dials
    }

    pub fn len(&self) -> usize {
        self.dials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dials.is_empty()
    }

    pub fn is_active(&self, id: DialId) -> bool {
        self.get(id).is_some_and(|d| d.enabled)
    }

    /// The dial, if it exists and is enabled.
    pub fn ensure_active(&self, id: DialId) -> Result<&Dial> {
        self.get(id)
            .filter(|d| d.enabled)
            .ok_or(EmissionsError::UnknownOrDisabledDial(id))
    }

    /// Disable a dial, returning the weighted votes it held.
    ///
    /// Voters still referencing it are left alone; their stale entries stop
    /// counting until they resubmit.
    pub fn disable(&mut self, id: DialId) -> Result<Power> {
        let dial = self
            .get_mut(id)
            .filter(|d| d.enabled)
            .ok_or(EmissionsError::UnknownOrDisabledDial(id))?;
        dial.enabled = false;
        Ok(std::mem::take(&mut dial.weighted_votes))
    }

    /// Sum of weighted votes across enabled dials, recomputed from the table.
    pub fn active_votes(&self) -> Option<Power> {
        self.dials
            .iter()
            .filter(|d| d.enabled)
            .try_fold(0u128, |acc, d| acc.checked_add(d.weighted_votes))
    }
}
