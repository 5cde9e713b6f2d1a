//! Pure contract types for photo-based height and weight estimation.
//!
//! Nothing in this crate touches the network: it describes what is sent to
//! the oracle, how its reply is validated and how BMI is derived from it.

pub mod analysis;
pub mod events;
pub mod metrics;
pub mod models;
