//! Per-stage and whole-run statistics

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::Entity;

/// Counts for one completed stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    pub entity: Entity,
    /// Successful upserts, new or refreshed
    pub inserted: u64,
    /// Duplicates; always zero because every write is an upsert
    pub skipped: u64,
    /// Dropped for an unresolved required reference
    pub filtered: u64,
    /// Kept with an unresolved optional reference nulled
    pub adjusted: u64,
    /// Upserts the store rejected
    pub failed: u64,
    /// Optional fields nulled because their text did not parse
    pub coerced: u64,
    pub elapsed_secs: f64,
}

impl StageStats {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            inserted: 0,
            skipped: 0,
            filtered: 0,
            adjusted: 0,
            failed: 0,
            coerced: 0,
            elapsed_secs: 0.0,
        }
    }

    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs_f64();
    }

    /// Rows that reached the validator
    pub fn processed(&self) -> u64 {
        self.inserted + self.skipped + self.filtered + self.failed
    }
}

/// Outcome of the companion serving sync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServingStats {
    pub created: u64,
    pub updated: u64,
    /// Existing rows left alone because in-place updates were off
    pub untouched: u64,
}

/// Totals for a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub stages: Vec<StageStats>,
    pub servings: Option<ServingStats>,
    pub elapsed_secs: f64,
}

impl RunSummary {
    pub fn push(&mut self, stage: StageStats) {
        self.stages.push(stage);
    }

    pub fn stage(&self, entity: Entity) -> Option<&StageStats> {
        self.stages.iter().find(|s| s.entity == entity)
    }

    pub fn total_inserted(&self) -> u64 {
        self.stages.iter().map(|s| s.inserted).sum()
    }

    pub fn total_skipped(&self) -> u64 {
        self.stages.iter().map(|s| s.skipped).sum()
    }

    pub fn total_filtered(&self) -> u64 {
        self.stages.iter().map(|s| s.filtered).sum()
    }

    pub fn total_adjusted(&self) -> u64 {
        self.stages.iter().map(|s| s.adjusted).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.stages.iter().map(|s| s.failed).sum()
    }

    pub fn total_coerced(&self) -> u64 {
        self.stages.iter().map(|s| s.coerced).sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const RULE: &str =
            "-----------------------------------------------------------------------------------";

        writeln!(
            f,
            "{:<15} {:>10} {:>8} {:>9} {:>9} {:>7} {:>8} {:>9}",
            "stage", "inserted", "skipped", "filtered", "adjusted", "failed", "coerced", "seconds"
        )?;
        writeln!(f, "{RULE}")?;
        for s in &self.stages {
            writeln!(
                f,
                "{:<15} {:>10} {:>8} {:>9} {:>9} {:>7} {:>8} {:>9.2}",
                s.entity.as_str(),
                s.inserted,
                s.skipped,
                s.filtered,
                s.adjusted,
                s.failed,
                s.coerced,
                s.elapsed_secs
            )?;
        }
        writeln!(f, "{RULE}")?;
        writeln!(
            f,
            "{:<15} {:>10} {:>8} {:>9} {:>9} {:>7} {:>8} {:>9.2}",
            "total",
            self.total_inserted(),
            self.total_skipped(),
            self.total_filtered(),
            self.total_adjusted(),
            self.total_failed(),
            self.total_coerced(),
            self.elapsed_secs
        )?;

        if let Some(servings) = &self.servings {
            writeln!(
                f,
                "servings: {} created, {} updated, {} untouched",
                servings.created, servings.updated, servings.untouched
            )?;
        }

        write!(f, "elapsed: {:.2}s", self.elapsed_secs)
    }
}
