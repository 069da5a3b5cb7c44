//! CLI command implementations for treegp.

pub(crate) mod evolve;
pub(crate) mod sample;

use std::error::Error;
use std::fmt;

/// CLI error type.
#[derive(Debug)]
pub(crate) struct CliError {
    message: String,
}

impl CliError {
    /// Create a new CLI error.
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("JSON error: {e}"))
    }
}

impl From<treegp::GpError> for CliError {
    fn from(e: treegp::GpError) -> Self {
        Self::new(e.to_string())
    }
}

impl From<treegp::ParamError> for CliError {
    fn from(e: treegp::ParamError) -> Self {
        Self::new(format!("invalid parameter: {e}"))
    }
}

/// Low 64 bits of a nanosecond timestamp.
fn nanos_seed(nanos: u128) -> u64 {
    u64::try_from(nanos & u128::from(u64::MAX)).unwrap_or(u64::MAX)
}

/// Seed from the clock when none is given.
pub(crate) fn seed_or_clock(seed: Option<u64>) -> u64 {
    seed.unwrap_or_else(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| nanos_seed(d.as_nanos()))
            .unwrap_or(42)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nanos_seed_keeps_low_bits() {
        assert_eq!(nanos_seed(1_234), 1_234);
        assert_eq!(nanos_seed(u128::from(u64::MAX) + 5), 4);
        assert_eq!(seed_or_clock(Some(7)), 7);
    }
}
