//! Shared primitives for the emissions engine: identifiers, reward units,
//! fixed-point helpers and the clock abstraction.

pub mod amount_str;
pub mod clock;
pub mod ids;
pub mod units;

pub use clock::*;
pub use ids::*;
pub use units::*;
