//! Serde-backed configuration: retry settings and named key strategies.

use crate::core::{KeyError, Result};
use crate::retry::{Backoff, RetryBuilder, RetryPredicateStage, TimeUnit};
use crate::strategy::KeyStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Retry parameters for calls into the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay handed to the backoff strategy, in `unit`.
    pub base_delay: u64,
    pub unit: TimeUnit,
    pub backoff: Backoff,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: 250,
            unit: TimeUnit::Milliseconds,
            backoff: Backoff::Exponential,
        }
    }
}

impl RetrySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn base_delay(mut self, base_delay: u64) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn unit(mut self, unit: TimeUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Starts a retry plan from these settings; only the failure
    /// predicate remains to be chosen.
    pub fn stages(&self) -> RetryPredicateStage {
        RetryBuilder::retry_times(self.max_attempts)
            .every(self.base_delay, self.unit)
            .with_backoff(self.backoff)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

/// Top-level configuration file.
///
/// ```json
/// {
///   "retry": { "max_attempts": 5, "base_delay": 100, "backoff": "linear" },
///   "strategies": {
///     "person": { "segments": ["property", "property"], "properties": ["last", "first"] }
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyforgeConfig {
    pub retry: RetrySettings,
    /// Key strategies by entity name.
    pub strategies: BTreeMap<String, KeyStrategy>,
}

impl KeyforgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_strategy(mut self, entity: impl Into<String>, strategy: KeyStrategy) -> Self {
        self.strategies.insert(entity.into(), strategy);
        self
    }

    pub fn strategy(&self, entity: &str) -> Result<&KeyStrategy> {
        self.strategies.get(entity).ok_or_else(|| {
            KeyError::ConfigurationError(format!("No key strategy configured for '{entity}'"))
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| {
            KeyError::IoError(format!("Failed to read {}: {err}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::KeySegment;

    #[test]
    fn defaults_match_store_retry_policy() {
        let settings = RetrySettings::default();
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.base_delay, 250);
        assert_eq!(settings.unit, TimeUnit::Milliseconds);
        assert_eq!(settings.backoff, Backoff::Exponential);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = RetrySettings::from_json_str(r#"{ "max_attempts": 5 }"#).unwrap();
        assert_eq!(settings, RetrySettings::new().max_attempts(5));
    }

    #[test]
    fn strategies_deserialize_by_entity_name() {
        let config = KeyforgeConfig::from_json_str(
            r#"{
                "strategies": {
                    "event": { "segments": ["property", "inverse_time"], "properties": ["stream"], "separator": "/" }
                }
            }"#,
        )
        .unwrap();
        let strategy = config.strategy("event").unwrap();
        assert_eq!(
            strategy.segments,
            vec![KeySegment::Property, KeySegment::InverseTime]
        );
        assert_eq!(strategy.separator, "/");
        assert!(matches!(
            config.strategy("missing"),
            Err(KeyError::ConfigurationError(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            KeyforgeConfig::from_json_str("{ not json"),
            Err(KeyError::ParseError(_))
        ));
    }

    #[test]
    fn stages_carry_the_settings() {
        let plan = RetrySettings::new()
            .base_delay(100)
            .backoff(Backoff::Linear)
            .stages()
            .matching(|_: &std::io::Error| true)
            .build()
            .unwrap();
        assert_eq!(plan.backoff_schedule(), vec![100, 200]);
    }
}
