//! Time utilities.
//!
//! [`Timestamp`] is the UCAN notion of time (whole seconds since the Unix
//! epoch) and [`TimeRange`] the validity window of a delegation chain.

pub mod range;
pub mod timestamp;

pub use range::*;
pub use timestamp::*;
