//! Nutri Ingest Library
//!
//! Loads the reference nutrition dataset (food categories, measure units,
//! nutrients, foods, per-food nutrient values and portions) from CSV files
//! into a relational store.
//!
//! The load runs as six ordered stages. Each stage streams one source file,
//! repairs or drops rows whose references do not resolve against what earlier
//! stages stored, and upserts the rest by natural key, so re-running a load
//! is always safe.
//!
//! # Example
//!
//! ```no_run
//! use nutri_ingest::{IngestConfig, MemoryStore, Pipeline, SourceResolver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::new("./data");
//!     let sources = SourceResolver::new(&config.data_dir).resolve()?;
//!
//!     let summary = Pipeline::new(config, MemoryStore::new(), sources).run().await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod decoder;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod stage;
pub mod stats;
pub mod store;
pub mod validator;

pub use config::{ErrorPolicy, IngestConfig, ServingOptions};
pub use error::{IngestError, IngestResult, StoreError};
pub use models::{Entity, Record};
pub use pipeline::Pipeline;
pub use source::{SourceMap, SourceResolver};
pub use stage::{Stage, StagePlan};
pub use stats::{RunSummary, ServingStats, StageStats};
pub use store::{MemoryStore, PgReferenceStore, ReferenceStore};
