//! Transfer options loading and validation.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};
use crate::provider::TransferStage;
use crate::schema::SchemaMatching;
use crate::version::VersionMatching;

/// Options controlling a transfer run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferOptions {
    /// Version compatibility strategy for the integrity check.
    pub version_matching: VersionMatching,

    /// Schema comparison strategy for the integrity check.
    pub schemas_matching: SchemaMatching,

    /// When non-empty, only the listed stages run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub only: Vec<TransferStage>,

    /// Stages to skip even when supported by both providers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<TransferStage>,

    /// Optional per-record delay, for rate-limiting remote destinations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_ms: Option<u64>,
}

impl TransferOptions {
    /// Load options from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse options from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let options: TransferOptions = serde_yaml::from_str(yaml)?;
        options.validate()?;
        Ok(options)
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        for stage in &self.only {
            if self.exclude.contains(stage) {
                return Err(TransferError::configuration(format!(
                    "stage {stage} is listed in both only and exclude"
                )));
            }
        }
        Ok(())
    }

    /// Whether a stage should run under the `only`/`exclude` filters.
    pub fn stage_enabled(&self, stage: TransferStage) -> bool {
        if !self.only.is_empty() && !self.only.contains(&stage) {
            return false;
        }
        !self.exclude.contains(&stage)
    }

    pub(crate) fn throttle(&self) -> Option<Duration> {
        self.throttle_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = TransferOptions::default();
        assert_eq!(options.version_matching, VersionMatching::Ignore);
        assert_eq!(options.schemas_matching, SchemaMatching::Strict);
        assert!(options.only.is_empty());
        assert!(options.exclude.is_empty());
        assert!(options.throttle_ms.is_none());
        for stage in TransferStage::ALL {
            assert!(options.stage_enabled(stage));
        }
    }

    #[test]
    fn test_from_yaml() {
        let options = TransferOptions::from_yaml(
            r#"
version_matching: minor
schemas_matching: exact
exclude: [assets]
throttle_ms: 5
"#,
        )
        .unwrap();

        assert_eq!(options.version_matching, VersionMatching::Minor);
        assert_eq!(options.schemas_matching, SchemaMatching::Exact);
        assert!(!options.stage_enabled(TransferStage::Assets));
        assert!(options.stage_enabled(TransferStage::Entities));
        assert_eq!(options.throttle_ms, Some(5));
    }

    #[test]
    fn test_only_filter() {
        let options = TransferOptions {
            only: vec![TransferStage::Schemas, TransferStage::Entities],
            ..Default::default()
        };

        assert!(options.stage_enabled(TransferStage::Schemas));
        assert!(options.stage_enabled(TransferStage::Entities));
        assert!(!options.stage_enabled(TransferStage::Links));
        assert!(!options.stage_enabled(TransferStage::Configuration));
    }

    #[test]
    fn test_conflicting_filters_rejected() {
        let options = TransferOptions {
            only: vec![TransferStage::Entities],
            exclude: vec![TransferStage::Entities],
            ..Default::default()
        };

        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("entities"));
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(TransferOptions::from_yaml("version_matching: sideways").is_err());
    }
}
