//! Ratekeeper Common Types
//!
//! Currency codes, monetary amounts, the static currency support table and
//! the timing constants shared by the rate engine and the service binary.

pub mod monetary;
pub mod support;
pub mod time;

pub use monetary::*;
pub use support::*;
pub use time::*;
