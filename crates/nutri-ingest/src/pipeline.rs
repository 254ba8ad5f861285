//! Stage orchestrator
//!
//! Runs the stage plan in order against a [`ReferenceStore`]. For each stage:
//!
//! 1. check every stage it depends on has completed
//! 2. read the identifier sets of the referenced entities from the store
//! 3. stream the source file row by row: decode, validate, upsert
//! 4. record a [`StageStats`] line
//!
//! Rows are never buffered; the only per-stage state is the referenced
//! identifier sets and the counters. A decode error aborts the run. A rejected
//! upsert is logged and counted under the lenient policy and aborts the run
//! under the strict one. Everything written before an abort stays written.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::decoder::{FromRow, RowDecoder};
use crate::error::{IngestError, IngestResult};
use crate::models::{Entity, Food, FoodCategory, FoodNutrient, FoodPortion, MeasureUnit, Nutrient, Record};
use crate::progress::stage_spinner;
use crate::source::SourceMap;
use crate::stage::{Stage, StagePlan};
use crate::stats::{RunSummary, StageStats};
use crate::store::ReferenceStore;
use crate::validator::{KnownIds, ReferenceCheck, ReferenceValidator};

pub struct Pipeline<S> {
    config: IngestConfig,
    store: S,
    sources: SourceMap,
    plan: StagePlan,
}

impl<S: ReferenceStore> Pipeline<S> {
    pub fn new(config: IngestConfig, store: S, sources: SourceMap) -> Self {
        Self {
            config,
            store,
            sources,
            plan: StagePlan::reference_dataset(),
        }
    }

    pub fn with_plan(mut self, plan: StagePlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Load every stage of the plan, then the optional serving sync
    pub async fn run(&mut self) -> IngestResult<RunSummary> {
        self.config.validate()?;
        let started = Instant::now();
        info!(
            root = %self.sources.root().display(),
            stages = self.plan.len(),
            policy = ?self.config.error_policy,
            limit = ?self.config.limit,
            "Starting ingestion"
        );

        for dataset in self.plan.datasets() {
            self.sources.require(dataset)?;
        }

        let mut summary = RunSummary::default();
        let mut completed: HashSet<Entity> = HashSet::new();

        for stage in self.plan.stages().to_vec() {
            if let Some(missing) = stage.depends_on.iter().find(|dep| !completed.contains(*dep)) {
                return Err(IngestError::StageOrder {
                    stage: stage.entity,
                    missing: *missing,
                });
            }

            let stats = self.run_stage(&stage).await?;
            completed.insert(stage.entity);
            summary.push(stats);
        }

        if self.config.servings.enabled {
            let servings = self
                .store
                .sync_servings(self.config.servings.update_existing)
                .await
                .map_err(IngestError::Servings)?;
            summary.servings = Some(servings);
        }

        summary.elapsed_secs = started.elapsed().as_secs_f64();
        info!(
            inserted = summary.total_inserted(),
            filtered = summary.total_filtered(),
            adjusted = summary.total_adjusted(),
            failed = summary.total_failed(),
            elapsed_secs = summary.elapsed_secs,
            "Ingestion complete"
        );

        Ok(summary)
    }

    async fn run_stage(&mut self, stage: &Stage) -> IngestResult<StageStats> {
        match stage.entity {
            Entity::FoodCategory => self.load::<FoodCategory>(stage).await,
            Entity::MeasureUnit => self.load::<MeasureUnit>(stage).await,
            Entity::Nutrient => self.load::<Nutrient>(stage).await,
            Entity::Food => self.load::<Food>(stage).await,
            Entity::FoodNutrient => self.load::<FoodNutrient>(stage).await,
            Entity::FoodPortion => self.load::<FoodPortion>(stage).await,
        }
    }

    async fn known_ids(&mut self, stage: &Stage) -> IngestResult<KnownIds> {
        let mut known = KnownIds::new();
        for &entity in stage.depends_on {
            let ids = self
                .store
                .known_ids(entity)
                .await
                .map_err(|source| IngestError::KnownIds { entity, source })?;
            debug!(stage = %stage.entity, entity = %entity, count = ids.len(), "Loaded reference ids");
            known.insert(entity, ids);
        }
        Ok(known)
    }

    async fn load<T>(&mut self, stage: &Stage) -> IngestResult<StageStats>
    where
        T: FromRow + ReferenceCheck + Into<Record>,
    {
        let started = Instant::now();
        let path = self.sources.require(stage.dataset)?.to_path_buf();
        info!(stage = %stage.entity, path = %path.display(), "Loading stage");

        let known = self.known_ids(stage).await?;
        let mut validator = ReferenceValidator::new(stage.entity, known);
        let mut decoder = RowDecoder::<T>::open(stage.dataset, &path)?.with_limit(self.config.limit);

        let mut stats = StageStats::new(stage.entity);
        let pb = stage_spinner(stage.dataset, self.config.show_progress);

        for row in decoder.by_ref() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    pb.abandon();
                    return Err(e);
                },
            };
            pb.inc(1);

            let Some(row) = validator.validate(row) else {
                continue;
            };
            let record: Record = row.into();

            match self.store.upsert(&record).await {
                Ok(()) => stats.inserted += 1,
                Err(source) if self.config.is_strict() => {
                    pb.abandon();
                    return Err(IngestError::Record {
                        entity: stage.entity,
                        key: record.key(),
                        source,
                    });
                },
                Err(source) => {
                    stats.failed += 1;
                    if stats.failed <= self.config.failure_log_limit {
                        warn!(
                            stage = %stage.entity,
                            key = %record.key(),
                            error = %source,
                            "Record rejected by store"
                        );
                    } else {
                        debug!(
                            stage = %stage.entity,
                            key = %record.key(),
                            error = %source,
                            "Record rejected by store"
                        );
                    }
                },
            }
        }

        if stats.failed > self.config.failure_log_limit {
            warn!(
                stage = %stage.entity,
                beyond_limit = stats.failed - self.config.failure_log_limit,
                "Further rejected records logged at debug level"
            );
        }

        stats.filtered = validator.filtered();
        stats.adjusted = validator.adjusted();
        stats.coerced = decoder.coerced();
        stats.set_elapsed(started.elapsed());
        pb.finish_and_clear();

        info!(
            stage = %stage.entity,
            inserted = stats.inserted,
            skipped = stats.skipped,
            filtered = stats.filtered,
            adjusted = stats.adjusted,
            failed = stats.failed,
            coerced = stats.coerced,
            elapsed_secs = stats.elapsed_secs,
            "Stage complete"
        );

        Ok(stats)
    }
}
