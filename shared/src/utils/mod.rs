//! Utility functions and helpers

pub mod time;

use anyhow::Result;

/// Parse a byte size string (e.g., "16384", "16k", "2M", "1G")
pub fn parse_size(s: &str) -> Result<usize> {
    let s = s.trim();
    let lower = s.to_ascii_lowercase();
    let (digits, scale) = if let Some(num) = lower.strip_suffix('k') {
        (num, 1024)
    } else if let Some(num) = lower.strip_suffix('m') {
        (num, 1024 * 1024)
    } else if let Some(num) = lower.strip_suffix('g') {
        (num, 1024 * 1024 * 1024)
    } else {
        (lower.as_str(), 1)
    };

    let value: usize = digits.trim().parse()?;
    value
        .checked_mul(scale)
        .ok_or_else(|| anyhow::anyhow!("Size out of range: {}", s))
}

/// Parse a boolean switch ("1", "true", "yes", "on" and their negatives)
pub fn parse_flag(s: &str) -> Result<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("Invalid boolean value: {}", other),
    }
}
