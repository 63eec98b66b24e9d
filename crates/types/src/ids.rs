use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors that can occur when parsing a voter or recipient handle.
#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error("handle must be {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("handle is not valid hexadecimal")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Number of raw bytes contained in a voter or recipient handle.
pub const HANDLE_BYTES: usize = 32;
/// Expected string length of an encoded handle.
pub const HANDLE_STRING_LENGTH: usize = HANDLE_BYTES * 2;

fn decode_handle(value: &str) -> Result<[u8; HANDLE_BYTES], HandleError> {
    let value = value.strip_prefix("0x").unwrap_or(value);
    if value.len() != HANDLE_STRING_LENGTH {
        return Err(HandleError::InvalidLength {
            expected: HANDLE_STRING_LENGTH,
            actual: value.len(),
        });
    }
    let mut bytes = [0u8; HANDLE_BYTES];
    hex::decode_to_slice(value, &mut bytes)?;
    Ok(bytes)
}

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(pub [u8; HANDLE_BYTES]);

        impl $name {
            /// Derive a deterministic handle from a human readable label.
            pub fn from_label(label: &str) -> Self {
                Self(*blake3::hash(label.as_bytes()).as_bytes())
            }

            /// Parse a 64 character hex string (an optional `0x` prefix is accepted).
            pub fn from_hex(value: &str) -> Result<Self, HandleError> {
                decode_handle(value).map(Self)
            }

            pub fn as_bytes(&self) -> &[u8; HANDLE_BYTES] {
                &self.0
            }
        }

        impl From<[u8; HANDLE_BYTES]> for $name {
            fn from(value: [u8; HANDLE_BYTES]) -> Self {
                Self(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                hex::encode(value.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = HandleError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::from_hex(&value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({}..)", stringify!($name), &hex::encode(&self.0[..4]))
            }
        }
    };
}

handle_type!(
    /// Identity of a stakeholder that allocates voting power across dials.
    VoterId
);

handle_type!(
    /// Opaque handle of the external payee behind a dial.
    RecipientId
);

/// Stable dial identity: the registration index inside the dial registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DialId(pub u32);

impl DialId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dial#{}", self.0)
    }
}
