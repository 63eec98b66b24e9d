//! Scenario files: a dial set, per-source voting power and an ordered list of
//! steps to drive the controller through.
//!
//! ```toml
//! dials = ["treasury", "grants", "liquidity"]
//!
//! [[sources]]
//! name = "staking"
//! powers = { alice = 300, bob = 600 }
//!
//! [[steps]]
//! action = "vote"
//! voter = "alice"
//! entries = [{ dial = 0, fraction = "0.2" }, { dial = 1, fraction = "0.8" }]
//!
//! [[steps]]
//! action = "advance"
//! epochs = 1
//!
//! [[steps]]
//! action = "distribute"
//! ```
//!
//! Voters, sources and dial recipients are referred to by label. Powers are
//! whole tokens; fractions are decimal strings (`"0.25"`) or percentages
//! (`"25%"`).

use anyhow::{bail, Context, Result};
use emissions_types::{Fraction, FIXED_POINT_DECIMALS, FIXED_POINT_SCALE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Unix time the controller is created at
    #[serde(default)]
    pub start_time: u64,
    /// Recipient labels registered at initialization, in dial id order
    pub dials: Vec<String>,
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    /// Voter label to whole tokens of power
    #[serde(default)]
    pub powers: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrySpec {
    pub dial: u32,
    pub fraction: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Vote {
        voter: String,
        #[serde(default)]
        entries: Vec<EntrySpec>,
    },
    SetPower {
        source: String,
        voter: String,
        power: u64,
    },
    Advance {
        #[serde(default)]
        epochs: u64,
        #[serde(default)]
        secs: u64,
    },
    Distribute,
    Retry,
    AddDial {
        recipient: String,
    },
    DisableDial {
        dial: u32,
    },
    /// Make the recipient's ledger account refuse credits
    Reject {
        recipient: String,
    },
    Accept {
        recipient: String,
    },
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid scenario {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let scenario: Scenario = toml::from_str(raw)?;
        let mut names = std::collections::HashSet::new();
        for source in &scenario.sources {
            if !names.insert(source.name.as_str()) {
                bail!("power source '{}' declared twice", source.name);
            }
        }
        Ok(scenario)
    }
}

/// Parse `"0.25"`, `"1"` or `"25%"` into an 18-decimal fixed-point fraction.
pub fn parse_fraction(raw: &str) -> Result<Fraction> {
    let raw = raw.trim();
    let (digits, exponent_shift) = match raw.strip_suffix('%') {
        Some(percent) => (percent.trim(), 2),
        None => (raw, 0),
    };

    let (whole, frac) = match digits.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (digits, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        bail!("empty fraction");
    }
    if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
        bail!("fraction '{raw}' is not a decimal number");
    }

    let decimals = FIXED_POINT_DECIMALS as usize - exponent_shift;
    if frac.len() > decimals {
        bail!("fraction '{raw}' has more than {decimals} decimal places");
    }

    let mut mantissa = String::with_capacity(whole.len() + decimals);
    mantissa.push_str(whole);
    mantissa.push_str(frac);
    mantissa.extend(std::iter::repeat('0').take(decimals - frac.len()));
    let value: u128 = mantissa
        .parse()
        .with_context(|| format!("fraction '{raw}' out of range"))?;

    if value > FIXED_POINT_SCALE {
        bail!("fraction '{raw}' exceeds 100%");
    }
    Ok(value)
}
