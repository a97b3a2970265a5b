//! Configuration types for the measurement runtime

use anyhow::Context;
use cadence_shared::utils::{parse_flag, parse_size};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Stack size given to intercepted threads created without attributes
pub const DEFAULT_STACK_SIZE: usize = 16384;

/// Upper bound accepted for `stack_size`
pub const MAX_STACK_SIZE: usize = 1 << 30;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Stack size in bytes for intercepted creation (0 = `DEFAULT_STACK_SIZE`)
    pub stack_size: usize,

    /// Let the activity tag take part in async activity ordering
    pub extended_correlation: bool,

    /// Optional JSON summary written at finalize
    pub output_path: Option<PathBuf>,

    /// `tracing` filter directive for diagnostics
    pub log_filter: String,

    /// Program name recorded in the report
    pub program: String,
}

impl Config {
    /// Read the configuration from `CADENCE_*` environment variables.
    ///
    /// Unlike `Default`, malformed values are reported instead of ignored.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::builtin();

        if let Ok(size) = std::env::var("CADENCE_PTHREAD_STACK_SIZE") {
            config.stack_size = parse_size(&size)
                .with_context(|| format!("Invalid CADENCE_PTHREAD_STACK_SIZE: {}", size))?;
        }
        if let Ok(flag) = std::env::var("CADENCE_EXTENDED_CORRELATION") {
            config.extended_correlation = parse_flag(&flag)
                .with_context(|| format!("Invalid CADENCE_EXTENDED_CORRELATION: {}", flag))?;
        }
        if let Ok(path) = std::env::var("CADENCE_OUTPUT") {
            if !path.is_empty() {
                config.output_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(filter) = std::env::var("CADENCE_LOG") {
            config.log_filter = filter;
        }
        if let Ok(program) = std::env::var("CADENCE_PROGRAM") {
            config.program = program;
        }

        Ok(config)
    }

    fn builtin() -> Self {
        Self {
            stack_size: 0,
            extended_correlation: false,
            output_path: None,
            log_filter: "warn".to_string(),
            program: "cadence".to_string(),
        }
    }

    /// Stack size actually applied to intercepted threads
    pub fn effective_stack_size(&self) -> usize {
        if self.stack_size == 0 {
            DEFAULT_STACK_SIZE
        } else {
            self.stack_size
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stack_size > MAX_STACK_SIZE {
            anyhow::bail!(
                "Stack size too large: {} bytes (max {})",
                self.stack_size,
                MAX_STACK_SIZE
            );
        }

        if self.program.trim().is_empty() {
            anyhow::bail!("Program name must not be empty");
        }

        if let Some(path) = &self.output_path {
            if path.as_os_str().is_empty() {
                anyhow::bail!("Output path must not be empty");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    /// Environment-derived configuration; unparseable values fall back to
    /// the built-in defaults.
    fn default() -> Self {
        let builtin = Self::builtin();
        Self {
            stack_size: std::env::var("CADENCE_PTHREAD_STACK_SIZE")
                .ok()
                .and_then(|s| parse_size(&s).ok())
                .unwrap_or(builtin.stack_size),
            extended_correlation: std::env::var("CADENCE_EXTENDED_CORRELATION")
                .ok()
                .and_then(|s| parse_flag(&s).ok())
                .unwrap_or(builtin.extended_correlation),
            output_path: std::env::var("CADENCE_OUTPUT")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            log_filter: std::env::var("CADENCE_LOG").unwrap_or(builtin.log_filter),
            program: std::env::var("CADENCE_PROGRAM").unwrap_or(builtin.program),
        }
    }
}
