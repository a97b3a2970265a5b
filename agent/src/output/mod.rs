//! Report output

pub mod json;

pub use json::{read_report, write_report};
