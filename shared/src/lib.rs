//! Shared types and utilities for Cadence
//!
//! This crate contains the identity and statistics types used by the
//! measurement agent, the GPU activity tables and the command-line front end.

pub mod types;
pub mod utils;

// Re-export commonly used types
pub use types::{events::*, identity::*, profile::*};
