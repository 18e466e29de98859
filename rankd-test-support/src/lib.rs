//! Test utilities for rankd.
//!
//! - [`faults`]: wrappers that fail or stall named store operations
//! - [`chaos`]: random failures and delays for stress tests

pub mod chaos;
pub mod faults;

pub use chaos::{ChaosEvent, ChaosMonkey};
pub use faults::{Fault, FaultPlan, FaultyIndex, FaultyLedger, FaultyResolver, FaultyStore};
