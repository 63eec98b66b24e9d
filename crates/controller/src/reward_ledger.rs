//! Reward ledger interface for dial payouts
//!
//! The controller pays each dial by crediting its recipient on a ledger owned by
//! the caller. `debit` exists only to unwind the credits of an epoch that has to
//! be aborted part-way through.

use anyhow::{anyhow, Result};
use emissions_types::{Amount, RecipientId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Interface for transferring rewards to dial recipients.
pub trait RewardLedger: Send + Sync {
    /// Credit a recipient with `amount` base units. An error means the
    /// recipient rejected the transfer.
    fn credit(&mut self, recipient: &RecipientId, amount: Amount) -> Result<()>;

    /// Take back a previous credit.
    fn debit(&mut self, recipient: &RecipientId, amount: Amount) -> Result<()>;

    /// Current balance of a recipient.
    fn balance_of(&self, recipient: &RecipientId) -> Amount;

    /// Sum of all balances.
    fn total_credited(&self) -> Amount;
}

// -----------------------------------------------------------------------------
// In-memory implementation (for simulation)
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryRewardLedger {
    balances: HashMap<RecipientId, Amount>,
    #[serde(with = "emissions_types::amount_str")]
    total: Amount,
}

impl InMemoryRewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balances(&self) -> &HashMap<RecipientId, Amount> {
        &self.balances
    }
}

impl RewardLedger for InMemoryRewardLedger {
    fn credit(&mut self, recipient: &RecipientId, amount: Amount) -> Result<()> {
        let balance = self.balances.entry(*recipient).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| anyhow!("balance overflow for {recipient}"))?;
        self.total = self.total.saturating_add(amount);
        Ok(())
    }

    fn debit(&mut self, recipient: &RecipientId, amount: Amount) -> Result<()> {
        let balance = self.balances.get(recipient).copied().unwrap_or(0);
        if balance < amount {
            return Err(anyhow!("insufficient balance for {recipient}"));
        }
        self.balances.insert(*recipient, balance - amount);
        self.total = self.total.saturating_sub(amount);
        Ok(())
    }

    fn balance_of(&self, recipient: &RecipientId) -> Amount {
        self.balances.get(recipient).copied().unwrap_or(0)
    }

    fn total_credited(&self) -> Amount {
        self.total
    }
}

// -----------------------------------------------------------------------------
// Mock ledger (for deterministic testing)
// -----------------------------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct MockRewardLedger {
    inner: InMemoryRewardLedger,
    rejecting: HashSet<RecipientId>,
    rejecting_debits: HashSet<RecipientId>,
    credit_calls: Vec<(RecipientId, Amount)>,
    debit_calls: Vec<(RecipientId, Amount)>,
}

impl MockRewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future credit to `recipient` fail.
    pub fn reject(&mut self, recipient: RecipientId) {
        self.rejecting.insert(recipient);
    }

    /// Let `recipient` accept transfers again.
    pub fn accept(&mut self, recipient: &RecipientId) {
        self.rejecting.remove(recipient);
    }

    /// Make every future debit from `recipient` fail.
    pub fn reject_debits(&mut self, recipient: RecipientId) {
        self.rejecting_debits.insert(recipient);
    }

    pub fn get_credit_calls(&self) -> &[(RecipientId, Amount)] {
        &self.credit_calls
    }

    pub fn get_debit_calls(&self) -> &[(RecipientId, Amount)] {
        &self.debit_calls
    }

    pub fn clear_calls(&mut self) {
        self.credit_calls.clear();
        self.debit_calls.clear();
    }
}

impl RewardLedger for MockRewardLedger {
    fn credit(&mut self, recipient: &RecipientId, amount: Amount) -> Result<()> {
        self.credit_calls.push((*recipient, amount));
        if self.rejecting.contains(recipient) {
            return Err(anyhow!("recipient {recipient} rejected transfer"));
        }
        self.inner.credit(recipient, amount)
    }

    fn debit(&mut self, recipient: &RecipientId, amount: Amount) -> Result<()> {
        self.debit_calls.push((*recipient, amount));
        if self.rejecting_debits.contains(recipient) {
            return Err(anyhow!("recipient {recipient} refused debit"));
        }
        self.inner.debit(recipient, amount)
    }

    fn balance_of(&self, recipient: &RecipientId) -> Amount {
        self.inner.balance_of(recipient)
    }

    fn total_credited(&self) -> Amount {
        self.inner.total_credited()
    }
}
