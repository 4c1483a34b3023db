//! Solver configuration.
//!
//! Configuration is a flat key → value store with typed accessors, in the
//! dotted-key convention the heuristics use (`HillClimber.MaxIdleIters`,
//! `GreatDeluge.CoolRate`, ...). Missing keys fall back to the caller's
//! default; present-but-malformed values are initialisation errors, as are
//! values outside a component's legal range.
//!
//! # Examples
//!
//! ```
//! use ifsearch_config::DataProperties;
//!
//! let properties = DataProperties::from_toml_str(r#"
//!     "Search.GreatDeluge" = false
//!     "HillClimber.MaxIdleIters" = 5000
//!     "GreatDeluge.CoolRate" = 0.9999999
//! "#).unwrap();
//!
//! assert!(!properties.get_bool("Search.GreatDeluge", true).unwrap());
//! assert_eq!(properties.get_int("HillClimber.MaxIdleIters", 10_000).unwrap(), 5000);
//! assert_eq!(properties.get_int("Termination.MaxIters", 42).unwrap(), 42);
//! ```

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value '{value}' for {key}: expected {expected}")]
    Invalid {
        key: String,
        value: String,
        expected: &'static str,
    },

    #[error("{key} = {value} is out of range ({low}, {high})")]
    OutOfRange {
        key: String,
        value: f64,
        low: f64,
        high: f64,
    },

    #[error("unknown selection '{0}'")]
    UnknownSelection(String),
}

/// Flat key → value configuration store.
#[derive(Debug, Clone, Default)]
pub struct DataProperties {
    map: HashMap<String, String>,
}

impl DataProperties {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from `(key, value)` pairs.
    pub fn from_pairs<K, S>(pairs: impl IntoIterator<Item = (K, S)>) -> Self
    where
        K: Into<String>,
        S: Into<String>,
    {
        Self {
            map: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parses a flat TOML table. Dotted keys must be quoted.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = s.parse()?;
        let mut map = HashMap::with_capacity(table.len());
        for (key, value) in table {
            let rendered = match value {
                toml::Value::String(s) => s,
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                other => other.to_string(),
            };
            map.insert(key, rendered);
        }
        Ok(Self { map })
    }

    /// Loads a flat TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Sets a property, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.map.insert(key.into(), value.to_string());
    }

    /// Raw string value, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// String value with a default.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.map
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    /// Boolean value with a default. `true`/`false`, case-insensitive.
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.map.get(key) {
            None => Ok(default),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(self.invalid(key, raw, "a boolean")),
            },
        }
    }

    /// Integer value with a default.
    pub fn get_int(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
        match self.map.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| self.invalid(key, raw, "an integer")),
        }
    }

    /// Floating point value with a default.
    pub fn get_double(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        match self.map.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| self.invalid(key, raw, "a number")),
        }
    }

    /// Floating point value constrained to the open interval `(low, high)`.
    pub fn get_double_in(
        &self,
        key: &str,
        default: f64,
        low: f64,
        high: f64,
    ) -> Result<f64, ConfigError> {
        let value = self.get_double(key, default)?;
        if value <= low || value >= high {
            return Err(ConfigError::OutOfRange {
                key: key.to_string(),
                value,
                low,
                high,
            });
        }
        Ok(value)
    }

    /// Strictly positive floating point value.
    pub fn get_positive_double(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        let value = self.get_double(key, default)?;
        if value <= 0.0 {
            return Err(ConfigError::OutOfRange {
                key: key.to_string(),
                value,
                low: 0.0,
                high: f64::INFINITY,
            });
        }
        Ok(value)
    }

    fn invalid(&self, key: &str, value: &str, expected: &'static str) -> ConfigError {
        ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let properties = DataProperties::new();
        assert!(properties.get_bool("Search.GreatDeluge", true).unwrap());
        assert_eq!(properties.get_int("HillClimber.MaxIdleIters", 10_000).unwrap(), 10_000);
        assert_eq!(
            properties
                .get_double("SimulatedAnnealing.InitialTemperature", 1.5)
                .unwrap(),
            1.5
        );
        assert_eq!(properties.get_string("Construction.Class", ""), "");
    }

    #[test]
    fn present_values_parse_with_type() {
        let properties = DataProperties::from_pairs([
            ("Search.CountSteps", "TRUE"),
            ("SimulatedAnnealing.TemperatureLength", "2500"),
            ("GreatDeluge.UpperBoundRate", "1.05"),
        ]);
        assert!(properties.get_bool("Search.CountSteps", false).unwrap());
        assert_eq!(
            properties
                .get_int("SimulatedAnnealing.TemperatureLength", 0)
                .unwrap(),
            2500
        );
        assert_eq!(
            properties.get_double("GreatDeluge.UpperBoundRate", 0.0).unwrap(),
            1.05
        );
    }

    #[test]
    fn malformed_values_error_instead_of_defaulting() {
        let properties = DataProperties::from_pairs([("HillClimber.MaxIdleIters", "lots")]);
        let err = properties.get_int("HillClimber.MaxIdleIters", 1).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn open_interval_validation() {
        let properties = DataProperties::from_pairs([("SimulatedAnnealing.CoolingRate", "1.0")]);
        let err = properties
            .get_double_in("SimulatedAnnealing.CoolingRate", 0.95, 0.0, 1.0)
            .unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));

        let ok = DataProperties::new()
            .get_double_in("SimulatedAnnealing.CoolingRate", 0.95, 0.0, 1.0)
            .unwrap();
        assert_eq!(ok, 0.95);
    }

    #[test]
    fn toml_round_trip_of_mixed_types() {
        let properties = DataProperties::from_toml_str(
            r#"
            "Construction.Class" = "greedy"
            "Construction.UntilComplete" = true
            "Neighbour.BranchAndBoundTimeout" = 10000
            "GreatDeluge.LowerBoundRate" = 0.95
            "#,
        )
        .unwrap();
        assert_eq!(properties.get("Construction.Class"), Some("greedy"));
        assert!(properties.get_bool("Construction.UntilComplete", false).unwrap());
        assert_eq!(
            properties.get_int("Neighbour.BranchAndBoundTimeout", 0).unwrap(),
            10_000
        );
        assert_eq!(
            properties.get_double("GreatDeluge.LowerBoundRate", 0.0).unwrap(),
            0.95
        );
    }
}
