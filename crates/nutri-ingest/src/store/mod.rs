//! Idempotent loader
//!
//! [`ReferenceStore`] is the only write path of the pipeline. Every write is
//! an upsert keyed on the entity's natural key, so re-running a load refreshes
//! rows in place instead of duplicating them.
//!
//! - [`PgReferenceStore`]: PostgreSQL, one connection held for the whole run
//! - [`MemoryStore`]: in-process tables with the same key and reference
//!   constraints, used for dry runs

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Entity, Record};
use crate::stats::ServingStats;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgReferenceStore;

/// Persistent home of the reference tables
#[async_trait]
pub trait ReferenceStore: Send {
    /// Identifiers currently stored for an entity
    ///
    /// `fdc_id` for foods, `id` for everything else.
    async fn known_ids(&mut self, entity: Entity) -> Result<HashSet<i32>, StoreError>;

    /// Insert the record, or overwrite every mapped field of the row with the same key
    async fn upsert(&mut self, record: &Record) -> Result<(), StoreError>;

    /// Write one simplified serving row per stored food
    ///
    /// Existing serving rows are only rewritten when `update_existing` is set.
    async fn sync_servings(&mut self, update_existing: bool) -> Result<ServingStats, StoreError>;
}
