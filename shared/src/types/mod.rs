//! Measurement data types

pub mod events;
pub mod identity;
pub mod profile;
