//! Run configuration, loaded from a `cvcrc`-style TOML file.

use crate::error::{IoError, IoResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CvcConfig {
    /// Path to the flat netlist file.
    pub netlist_path: Option<String>,
    /// Path to the device model file.
    pub model_path: Option<String>,
    /// Path to the power/ground declaration file.
    pub power_path: Option<String>,
    /// Path the error report is written to; stdout if unset.
    pub report_path: Option<String>,

    /// Gate-oxide / junction overvoltage limit, in mV.
    pub overvoltage_limit_mv: i32,
    /// Per-error-kind report cap before further instances are only
    /// counted.
    pub max_reports_per_kind: usize,

    /// Treat an undefined macro in a voltage expression as a warning
    /// (propagate `Voltage::UNKNOWN`) rather than a hard parse error.
    pub permit_undefined_macros: bool,

    pub log_level: String,
}

impl Default for CvcConfig {
    fn default() -> Self {
        Self {
            netlist_path: None,
            model_path: None,
            power_path: None,
            report_path: None,
            overvoltage_limit_mv: 3600,
            max_reports_per_kind: 100,
            permit_undefined_macros: false,
            log_level: "info".to_string(),
        }
    }
}

impl CvcConfig {
    pub fn load(path: impl AsRef<Path>) -> IoResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> IoResult<Self> {
        toml::from_str(text).map_err(|e| IoError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CvcConfig::default();
        assert_eq!(config.overvoltage_limit_mv, 3600);
        assert!(!config.permit_undefined_macros);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config = CvcConfig::parse("overvoltage_limit_mv = 5000\n").unwrap();
        assert_eq!(config.overvoltage_limit_mv, 5000);
        assert_eq!(config.max_reports_per_kind, 100);
    }

    #[test]
    fn rejects_malformed_toml() {
        let result = CvcConfig::parse("this is not [ toml");
        assert!(result.is_err());
    }
}
