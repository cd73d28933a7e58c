//! Error types for the transfer engine.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::provider::TransferStage;
use crate::schema::SchemaDiff;
use crate::version::VersionMatching;

/// Main error type for transfer operations.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Configuration error (wrong provider role, conflicting options, etc.)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Source and destination versions cannot be matched under the chosen strategy.
    #[error("Incompatible versions: source v{source_version} and destination v{destination_version} under the {strategy} strategy")]
    VersionMismatch {
        source_version: String,
        destination_version: String,
        strategy: VersionMatching,
    },

    /// Source and destination schemas differ for one or more entity types.
    #[error("Schema mismatch between source and destination for: {}", mismatched_keys(.diffs))]
    SchemaMismatch {
        diffs: BTreeMap<String, Vec<SchemaDiff>>,
    },

    /// The integrity gate failed; details live in the engine's last integrity failure.
    #[error("unable to transfer between {source_name} and {destination_name}")]
    UnableToTransfer {
        source_name: String,
        destination_name: String,
    },

    /// A provider hook or stream reported a failure.
    #[error("Provider {provider} error: {message}")]
    Provider { provider: String, message: String },

    /// A transfer stage failed mid-stream.
    #[error("Stage {stage} failed: {message}")]
    Stage {
        stage: TransferStage,
        message: String,
    },

    /// IO error (option file loading)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TransferError {
    /// Create a Configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        TransferError::Configuration(message.into())
    }

    /// Create a Provider error.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        TransferError::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a Stage error.
    pub fn stage(stage: TransferStage, message: impl Into<String>) -> Self {
        TransferError::Stage {
            stage,
            message: message.into(),
        }
    }
}

fn mismatched_keys(diffs: &BTreeMap<String, Vec<SchemaDiff>>) -> String {
    diffs.keys().cloned().collect::<Vec<_>>().join(", ")
}

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaDiffKind;

    #[test]
    fn test_schema_mismatch_lists_keys() {
        let mut diffs = BTreeMap::new();
        diffs.insert(
            "article".to_string(),
            vec![SchemaDiff {
                path: "attributes.title".to_string(),
                kind: SchemaDiffKind::Added,
            }],
        );
        diffs.insert("page".to_string(), vec![]);

        let err = TransferError::SchemaMismatch { diffs };
        let message = err.to_string();
        assert!(message.contains("article"));
        assert!(message.contains("page"));
    }

    #[test]
    fn test_unable_to_transfer_names_both_providers() {
        let err = TransferError::UnableToTransfer {
            source_name: "export-file".to_string(),
            destination_name: "local-instance".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("export-file"));
        assert!(message.contains("local-instance"));
    }

    #[test]
    fn test_version_mismatch_is_a_leaf_error() {
        use std::error::Error;

        let err = TransferError::VersionMismatch {
            source_version: "1.2.3".to_string(),
            destination_version: "2.0.0".to_string(),
            strategy: VersionMatching::Patch,
        };

        // The version fields are plain data, not a wrapped cause.
        assert!(err.source().is_none());
        let message = err.to_string();
        assert!(message.contains("1.2.3"));
        assert!(message.contains("2.0.0"));
    }
}
