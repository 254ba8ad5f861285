//! Pipeline error types
//!
//! [`IngestError`] is fatal: it aborts the run and reaches the process
//! boundary. [`StoreError`] describes a single failed store operation; the
//! pipeline absorbs it per record unless the strict policy is active.

use std::path::PathBuf;
use thiserror::Error;

use crate::models::Entity;

/// Result type alias for pipeline operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Fatal pipeline errors
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Source directory {} does not exist or is not a directory", .0.display())]
    SourceRoot(PathBuf),

    #[error("Failed to scan {}: {source}", .root.display())]
    Scan {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Missing source: no '{dataset}' file found under {}", .root.display())]
    MissingSource { dataset: String, root: PathBuf },

    #[error("Failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {dataset}: {source}")]
    Csv {
        dataset: String,
        #[source]
        source: csv::Error,
    },

    #[error("{dataset} is missing required column '{column}'")]
    MissingColumn { dataset: String, column: &'static str },

    #[error("{dataset} line {line}: invalid {column} '{value}': {reason}")]
    Decode {
        dataset: String,
        line: u64,
        column: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to load known {entity} ids: {source}")]
    KnownIds {
        entity: Entity,
        #[source]
        source: StoreError,
    },

    #[error("{entity} {key} rejected by store: {source}")]
    Record {
        entity: Entity,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("Serving sync failed: {0}")]
    Servings(#[source] StoreError),

    #[error("Stage {stage} cannot run before {missing} has been loaded")]
    StageOrder { stage: Entity, missing: Entity },

    #[error("Invalid stage plan: {0}")]
    Plan(String),

    #[error(transparent)]
    Common(#[from] nutri_common::NutriError),
}

/// A failed store operation
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Key or reference constraint rejected the write
    #[error("Constraint violation: {0}")]
    Constraint(String),
}

impl StoreError {
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_names_location() {
        let err = IngestError::Decode {
            dataset: "food".to_string(),
            line: 42,
            column: "fdc_id",
            value: "abc".to_string(),
            reason: "invalid digit found in string".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "food line 42: invalid fdc_id 'abc': invalid digit found in string"
        );
    }

    #[test]
    fn test_record_error_names_entity_and_key() {
        let err = IngestError::Record {
            entity: Entity::Nutrient,
            key: "nutrient_nbr=203".to_string(),
            source: StoreError::constraint("duplicate id 1003"),
        };
        assert_eq!(
            err.to_string(),
            "nutrient nutrient_nbr=203 rejected by store: Constraint violation: duplicate id 1003"
        );
    }
}
