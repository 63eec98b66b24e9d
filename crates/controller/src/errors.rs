use emissions_types::{Amount, DialId, RecipientId, Timestamp};
use thiserror::Error;

/// Errors raised by the emissions controller.
///
/// Every variant is returned before any state is committed; a failed call leaves
/// dial totals, allocations and epoch state exactly as they were.
#[derive(Debug, Error)]
pub enum EmissionsError {
    #[error("invalid allocation: {0}")]
    InvalidAllocation(String),

    #[error("{0} does not exist or is disabled")]
    UnknownOrDisabledDial(DialId),

    #[error("distribution too early: now={now}, next allowed at {next_allowed}")]
    TooEarly {
        now: Timestamp,
        next_allowed: Timestamp,
    },

    #[error("transfer to {dial} rejected: {reason}")]
    RecipientTransferFailure { dial: DialId, reason: String },

    /// The epoch was aborted but the ledger refused to reverse some credits.
    /// Controller state is unchanged; `unreversed` lists what the ledger kept.
    #[error(
        "transfer to {dial} rejected ({reason}) and {} earlier credit(s) could not be reversed",
        .unreversed.len()
    )]
    IncompleteUnwind {
        dial: DialId,
        reason: String,
        unreversed: Vec<(DialId, Amount)>,
    },

    #[error("invalid emissions parameter: {0}")]
    InvalidParameter(String),

    #[error("recipient {0} already has a dial")]
    DuplicateDial(RecipientId),

    #[error("dial registry already initialized")]
    AlreadyInitialized,

    #[error("reward budget exhausted after {epochs} epochs")]
    BudgetExhausted { epochs: u64 },

    #[error("voting power source '{source_name}' failed: {reason}")]
    PowerSourceFailure { source_name: String, reason: String },

    #[error("arithmetic overflow: {0}")]
    ArithmeticOverflow(&'static str),

    #[error("vote conservation violated: {0}")]
    InvariantViolation(String),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for emissions operations
pub type Result<T> = std::result::Result<T, EmissionsError>;
