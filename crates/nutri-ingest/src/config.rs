//! Ingestion run configuration

use std::path::PathBuf;

use nutri_common::{NutriError, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Defaults
// ============================================================================

/// Default root searched for source files.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Number of failed records logged at warn level per stage before going quiet.
pub const DEFAULT_FAILURE_LOG_LIMIT: u64 = 10;

/// What a rejected upsert does to the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log the record and keep going
    #[default]
    Lenient,
    /// Abort on the first rejected record
    Strict,
}

/// Companion `food_serving` synthesis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingOptions {
    pub enabled: bool,
    /// Rewrite serving rows that already exist
    pub update_existing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub data_dir: PathBuf,
    /// Preferred release folder under `data_dir`
    pub release: Option<String>,
    pub error_policy: ErrorPolicy,
    pub servings: ServingOptions,
    /// Per-stage row cap
    pub limit: Option<usize>,
    pub show_progress: bool,
    pub failure_log_limit: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            release: None,
            error_policy: ErrorPolicy::default(),
            servings: ServingOptions::default(),
            limit: None,
            show_progress: false,
            failure_log_limit: DEFAULT_FAILURE_LOG_LIMIT,
        }
    }
}

impl IngestConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_release(mut self, release: Option<String>) -> Self {
        self.release = release;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_servings(mut self, enabled: bool, update_existing: bool) -> Self {
        self.servings = ServingOptions {
            enabled,
            update_existing,
        };
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.error_policy == ErrorPolicy::Strict
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == Some(0) {
            return Err(NutriError::config("limit must be greater than 0"));
        }

        if self.servings.update_existing && !self.servings.enabled {
            return Err(NutriError::config(
                "--update-servings requires --sync-servings",
            ));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(NutriError::config("data directory cannot be empty"));
        }

        Ok(())
    }
}
