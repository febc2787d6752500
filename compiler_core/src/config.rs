//! When expressions get compiled.
//!
//! The process-wide default is read once from `EXPR_COMPILER_MODE` and
//! `EXPR_COMPILER_THRESHOLD`; an [`ExpressionParser`](crate::ExpressionParser)
//! can override it for the expressions it parses.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::warn;

pub const MODE_VARIABLE: &str = "EXPR_COMPILER_MODE";
pub const THRESHOLD_VARIABLE: &str = "EXPR_COMPILER_THRESHOLD";
pub const DEFAULT_THRESHOLD: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown compiler mode '{0}', expected off, interpreted, immediate or mixed")]
    InvalidMode(String),
    #[error("invalid compiler threshold '{0}'")]
    InvalidThreshold(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerMode {
    InterpretedOnly,
    /// Compile after the first successful interpreted evaluation.
    CompileImmediately,
    /// Compile after this many successful interpreted evaluations.
    CompileAfterThreshold(u32),
}

impl fmt::Display for CompilerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilerMode::InterpretedOnly => f.write_str("interpreted"),
            CompilerMode::CompileImmediately => f.write_str("immediate"),
            CompilerMode::CompileAfterThreshold(n) => write!(f, "mixed({n})"),
        }
    }
}

/// `off|interpreted|immediate|mixed`; `mixed` uses the default threshold.
impl FromStr for CompilerMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "interpreted" => Ok(CompilerMode::InterpretedOnly),
            "immediate" => Ok(CompilerMode::CompileImmediately),
            "mixed" => Ok(CompilerMode::CompileAfterThreshold(DEFAULT_THRESHOLD)),
            _ => Err(ConfigError::InvalidMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerConfiguration {
    pub mode: CompilerMode,
}

impl Default for CompilerConfiguration {
    fn default() -> Self {
        CompilerConfiguration { mode: CompilerMode::InterpretedOnly }
    }
}

impl CompilerConfiguration {
    pub fn new(mode: CompilerMode) -> Self {
        CompilerConfiguration { mode }
    }

    pub fn interpreted_only() -> Self {
        CompilerConfiguration::new(CompilerMode::InterpretedOnly)
    }

    pub fn immediate() -> Self {
        CompilerConfiguration::new(CompilerMode::CompileImmediately)
    }

    pub fn after_threshold(threshold: u32) -> Self {
        CompilerConfiguration::new(CompilerMode::CompileAfterThreshold(threshold))
    }

    /// Successful interpreted evaluations before compiling, or `None` when
    /// expressions are never compiled.
    pub fn threshold(&self) -> Option<u32> {
        match self.mode {
            CompilerMode::InterpretedOnly => None,
            CompilerMode::CompileImmediately => Some(1),
            CompilerMode::CompileAfterThreshold(n) => Some(n.max(1)),
        }
    }

    /// Build a configuration from the two environment settings. An unset mode
    /// means interpreted only; a threshold only matters for `mixed`.
    pub fn from_settings(mode: Option<&str>, threshold: Option<&str>) -> Result<Self, ConfigError> {
        let mode = match mode {
            Some(text) => text.parse()?,
            None => CompilerMode::InterpretedOnly,
        };
        let mode = match (mode, threshold) {
            (CompilerMode::CompileAfterThreshold(_), Some(text)) => {
                let n = text.trim().parse().map_err(|_| ConfigError::InvalidThreshold(text.to_string()))?;
                CompilerMode::CompileAfterThreshold(n)
            }
            (mode, _) => mode,
        };
        Ok(CompilerConfiguration { mode })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = std::env::var(MODE_VARIABLE).ok();
        let threshold = std::env::var(THRESHOLD_VARIABLE).ok();
        CompilerConfiguration::from_settings(mode.as_deref(), threshold.as_deref())
    }
}

static GLOBAL: LazyLock<RwLock<CompilerConfiguration>> = LazyLock::new(|| {
    let configuration = CompilerConfiguration::from_env().unwrap_or_else(|error| {
        warn!(%error, "ignoring compiler settings from the environment");
        CompilerConfiguration::default()
    });
    RwLock::new(configuration)
});

pub fn global_configuration() -> CompilerConfiguration {
    *GLOBAL.read()
}

pub fn set_global_configuration(configuration: CompilerConfiguration) {
    *GLOBAL.write() = configuration;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, None, CompilerMode::InterpretedOnly)]
    #[case(Some("off"), None, CompilerMode::InterpretedOnly)]
    #[case(Some("Interpreted"), Some("5"), CompilerMode::InterpretedOnly)]
    #[case(Some("immediate"), Some("5"), CompilerMode::CompileImmediately)]
    #[case(Some("mixed"), None, CompilerMode::CompileAfterThreshold(DEFAULT_THRESHOLD))]
    #[case(Some("mixed"), Some(" 7 "), CompilerMode::CompileAfterThreshold(7))]
    fn settings(#[case] mode: Option<&str>, #[case] threshold: Option<&str>, #[case] expected: CompilerMode) {
        assert_eq!(CompilerConfiguration::from_settings(mode, threshold).unwrap().mode, expected);
    }

    #[test]
    fn invalid_settings() {
        assert_eq!(
            CompilerConfiguration::from_settings(Some("sometimes"), None),
            Err(ConfigError::InvalidMode("sometimes".to_string()))
        );
        assert_eq!(
            CompilerConfiguration::from_settings(Some("mixed"), Some("-3")),
            Err(ConfigError::InvalidThreshold("-3".to_string()))
        );
    }

    #[test]
    fn thresholds() {
        assert_eq!(CompilerConfiguration::interpreted_only().threshold(), None);
        assert_eq!(CompilerConfiguration::immediate().threshold(), Some(1));
        assert_eq!(CompilerConfiguration::after_threshold(0).threshold(), Some(1));
        assert_eq!(CompilerConfiguration::after_threshold(3).threshold(), Some(3));
    }
}
