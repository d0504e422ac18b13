//! Integrity verifier configuration.

use crate::error::SchemaLensError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// How two indexes on the same table are compared for redundancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RedundancyRule {
    /// Every column of one index appears somewhere in the other.
    #[default]
    Subset,
    /// One index's columns are the leading columns of the other, in order.
    LeadingPrefix,
}

/// Configuration for [`IntegrityVerifier`](super::IntegrityVerifier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Deadline for the whole run. `None` waits for every check.
    pub timeout: Option<Duration>,
    /// Declared types exempt from the nullable-column check, compared
    /// case-insensitively.
    pub auto_increment_types: Vec<String>,
    /// Index comparison used by the redundant-index check.
    pub redundancy_rule: RedundancyRule,
    /// Report only one direction when two indexes cover the same columns.
    pub dedupe_redundant_indexes: bool,
    /// Leave indexes with no plain columns (expression indexes) out of the
    /// redundant-index check. Otherwise an empty column list counts as
    /// covered by every other index on the table.
    #[serde(default)]
    pub skip_expression_indexes: bool,
    /// Count a lone table with a foreign key to itself as a cycle.
    pub report_self_references: bool,
}

/// Validation errors for verifier configuration.
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("auto_increment_types must not contain blank entries")]
    BlankAutoIncrementType,
}

impl From<ConfigValidationError> for SchemaLensError {
    fn from(error: ConfigValidationError) -> Self {
        SchemaLensError::configuration(error.to_string())
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            auto_increment_types: vec![
                "serial".to_string(),
                "bigserial".to_string(),
                "smallserial".to_string(),
            ],
            redundancy_rule: RedundancyRule::Subset,
            dedupe_redundant_indexes: false,
            skip_expression_indexes: false,
            report_self_references: true,
        }
    }
}

impl VerifierConfig {
    /// Creates a new verifier config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the auto-increment type list.
    pub fn with_auto_increment_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auto_increment_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_redundancy_rule(mut self, rule: RedundancyRule) -> Self {
        self.redundancy_rule = rule;
        self
    }

    pub fn with_dedupe_redundant_indexes(mut self, dedupe: bool) -> Self {
        self.dedupe_redundant_indexes = dedupe;
        self
    }

    pub fn with_skip_expression_indexes(mut self, skip: bool) -> Self {
        self.skip_expression_indexes = skip;
        self
    }

    pub fn with_report_self_references(mut self, report: bool) -> Self {
        self.report_self_references = report;
        self
    }

    /// Whether `data_type` is one of the configured auto-increment types.
    pub fn is_auto_increment(&self, data_type: &str) -> bool {
        let data_type = data_type.trim();
        self.auto_increment_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(data_type))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigValidationError::ZeroTimeout);
        }
        if self.auto_increment_types.iter().any(|t| t.trim().is_empty()) {
            return Err(ConfigValidationError::BlankAutoIncrementType);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_config_default() {
        let config = VerifierConfig::default();
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.redundancy_rule, RedundancyRule::Subset);
        assert!(!config.dedupe_redundant_indexes);
        assert!(!config.skip_expression_indexes);
        assert!(config.report_self_references);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auto_increment_match_is_case_insensitive() {
        let config = VerifierConfig::default();
        assert!(config.is_auto_increment("serial"));
        assert!(config.is_auto_increment("BIGSERIAL"));
        assert!(!config.is_auto_increment("integer"));
    }

    #[test]
    fn test_verifier_config_builder() {
        let config = VerifierConfig::new()
            .with_timeout(None)
            .with_auto_increment_types(["identity"])
            .with_redundancy_rule(RedundancyRule::LeadingPrefix)
            .with_dedupe_redundant_indexes(true)
            .with_skip_expression_indexes(true)
            .with_report_self_references(false);

        assert!(config.timeout.is_none());
        assert!(config.is_auto_increment("IDENTITY"));
        assert!(!config.is_auto_increment("serial"));
        assert_eq!(config.redundancy_rule, RedundancyRule::LeadingPrefix);
        assert!(config.dedupe_redundant_indexes);
        assert!(config.skip_expression_indexes);
        assert!(!config.report_self_references);
    }

    #[test]
    fn test_config_without_expression_flag_deserializes() {
        let json = r#"{"timeout":null,"auto_increment_types":["serial"],"redundancy_rule":"subset","dedupe_redundant_indexes":false,"report_self_references":true}"#;
        let config: VerifierConfig = serde_json::from_str(json).unwrap();
        assert!(!config.skip_expression_indexes);
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let config = VerifierConfig::new().with_timeout(Some(Duration::ZERO));
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::ZeroTimeout)
        ));
    }

    #[test]
    fn test_validation_rejects_blank_type() {
        let config = VerifierConfig::new().with_auto_increment_types(["serial", " "]);
        let err: SchemaLensError = config.validate().unwrap_err().into();
        assert!(matches!(err, SchemaLensError::Configuration { .. }));
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = VerifierConfig::new().with_redundancy_rule(RedundancyRule::LeadingPrefix);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"leading-prefix\""));
        let back: VerifierConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.redundancy_rule, RedundancyRule::LeadingPrefix);
        assert_eq!(back.timeout, config.timeout);
    }
}
