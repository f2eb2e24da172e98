//! Core types and math for the TWAP oracle
//!
//! This crate provides what every other component shares:
//! - Pool configuration and decoded pool state
//! - Tick / sqrt-price math on `rust_decimal` values
//! - Snapshots and their JSON wire format
//! - Process configuration and error types

pub mod types;
pub mod pools;
pub mod math;
pub mod snapshot;
pub mod settings;
pub mod errors;

pub use types::*;
pub use pools::*;
pub use snapshot::*;
pub use settings::*;
pub use errors::*;
