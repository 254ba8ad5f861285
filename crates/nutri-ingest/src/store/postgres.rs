//! PostgreSQL reference store
//!
//! Each upsert is its own statement on a single pooled connection, so every
//! row is durable as soon as it is written and a failing row never rolls back
//! its neighbours.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tracing::{debug, info};

use super::ReferenceStore;
use crate::error::StoreError;
use crate::models::{Entity, Food, FoodCategory, FoodNutrient, FoodPortion, MeasureUnit, Nutrient, Record};
use crate::stats::ServingStats;

const UPSERT_FOOD_CATEGORY: &str = r#"
    INSERT INTO food_category (id, code, description)
    VALUES ($1, $2, $3)
    ON CONFLICT (id) DO UPDATE SET
        code = EXCLUDED.code,
        description = EXCLUDED.description,
        updated_at = NOW()
"#;

const UPSERT_MEASURE_UNIT: &str = r#"
    INSERT INTO measure_unit (id, name)
    VALUES ($1, $2)
    ON CONFLICT (id) DO UPDATE SET
        name = EXCLUDED.name,
        updated_at = NOW()
"#;

// keyed on the nutrient number; the id of an existing row never changes
const UPSERT_NUTRIENT: &str = r#"
    INSERT INTO nutrient (id, name, unit_name, nutrient_nbr, rank)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (nutrient_nbr) DO UPDATE SET
        name = EXCLUDED.name,
        unit_name = EXCLUDED.unit_name,
        rank = EXCLUDED.rank,
        updated_at = NOW()
"#;

const UPSERT_FOOD: &str = r#"
    INSERT INTO food (fdc_id, data_type, description, food_category_id, publication_date)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (fdc_id) DO UPDATE SET
        data_type = EXCLUDED.data_type,
        description = EXCLUDED.description,
        food_category_id = EXCLUDED.food_category_id,
        publication_date = EXCLUDED.publication_date,
        updated_at = NOW()
"#;

const UPSERT_FOOD_NUTRIENT: &str = r#"
    INSERT INTO food_nutrient (
        id, fdc_id, nutrient_id, amount, data_points, derivation_id,
        min, max, median, loq, footnote, min_year_acquired, percent_daily_value
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    ON CONFLICT (id) DO UPDATE SET
        fdc_id = EXCLUDED.fdc_id,
        nutrient_id = EXCLUDED.nutrient_id,
        amount = EXCLUDED.amount,
        data_points = EXCLUDED.data_points,
        derivation_id = EXCLUDED.derivation_id,
        min = EXCLUDED.min,
        max = EXCLUDED.max,
        median = EXCLUDED.median,
        loq = EXCLUDED.loq,
        footnote = EXCLUDED.footnote,
        min_year_acquired = EXCLUDED.min_year_acquired,
        percent_daily_value = EXCLUDED.percent_daily_value,
        updated_at = NOW()
"#;

const UPSERT_FOOD_PORTION: &str = r#"
    INSERT INTO food_portion (
        id, fdc_id, seq_num, amount, measure_unit_id, portion_description,
        modifier, gram_weight, data_points, footnote, min_year_acquired
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (id) DO UPDATE SET
        fdc_id = EXCLUDED.fdc_id,
        seq_num = EXCLUDED.seq_num,
        amount = EXCLUDED.amount,
        measure_unit_id = EXCLUDED.measure_unit_id,
        portion_description = EXCLUDED.portion_description,
        modifier = EXCLUDED.modifier,
        gram_weight = EXCLUDED.gram_weight,
        data_points = EXCLUDED.data_points,
        footnote = EXCLUDED.footnote,
        min_year_acquired = EXCLUDED.min_year_acquired,
        updated_at = NOW()
"#;

/// Serving rows: first weighted portion by `seq_num`, else 100 g.
/// `xmax = 0` marks rows that were inserted rather than updated.
const SYNC_SERVINGS_UPDATE: &str = r#"
    WITH first_portion AS (
        SELECT DISTINCT ON (fdc_id) fdc_id, gram_weight
        FROM food_portion
        WHERE gram_weight > 0
        ORDER BY fdc_id, seq_num NULLS LAST, id
    ),
    written AS (
        INSERT INTO food_serving (fdc_id, name, serving_size, serving_unit)
        SELECT f.fdc_id, f.description, COALESCE(fp.gram_weight, 100), 'g'
        FROM food f
        LEFT JOIN first_portion fp ON fp.fdc_id = f.fdc_id
        ON CONFLICT (fdc_id) DO UPDATE SET
            name = EXCLUDED.name,
            serving_size = EXCLUDED.serving_size,
            serving_unit = EXCLUDED.serving_unit,
            updated_at = NOW()
        RETURNING (xmax = 0) AS inserted
    )
    SELECT
        COUNT(*) FILTER (WHERE inserted) AS created,
        COUNT(*) FILTER (WHERE NOT inserted) AS updated
    FROM written
"#;

const SYNC_SERVINGS_INSERT_ONLY: &str = r#"
    WITH first_portion AS (
        SELECT DISTINCT ON (fdc_id) fdc_id, gram_weight
        FROM food_portion
        WHERE gram_weight > 0
        ORDER BY fdc_id, seq_num NULLS LAST, id
    ),
    written AS (
        INSERT INTO food_serving (fdc_id, name, serving_size, serving_unit)
        SELECT f.fdc_id, f.description, COALESCE(fp.gram_weight, 100), 'g'
        FROM food f
        LEFT JOIN first_portion fp ON fp.fdc_id = f.fdc_id
        ON CONFLICT (fdc_id) DO NOTHING
        RETURNING fdc_id
    )
    SELECT COUNT(*) AS created, 0::BIGINT AS updated FROM written
"#;

/// Reference store backed by PostgreSQL
pub struct PgReferenceStore {
    conn: PoolConnection<Postgres>,
}

impl PgReferenceStore {
    /// Take one connection out of the pool for the lifetime of the run
    pub async fn connect(pool: &PgPool) -> Result<Self, StoreError> {
        let conn = pool.acquire().await?;
        debug!("Acquired store connection");
        Ok(Self { conn })
    }

    async fn upsert_food_category(&mut self, r: &FoodCategory) -> Result<(), StoreError> {
        sqlx::query(UPSERT_FOOD_CATEGORY)
            .bind(r.id)
            .bind(&r.code)
            .bind(&r.description)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn upsert_measure_unit(&mut self, r: &MeasureUnit) -> Result<(), StoreError> {
        sqlx::query(UPSERT_MEASURE_UNIT)
            .bind(r.id)
            .bind(&r.name)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn upsert_nutrient(&mut self, r: &Nutrient) -> Result<(), StoreError> {
        sqlx::query(UPSERT_NUTRIENT)
            .bind(r.id)
            .bind(&r.name)
            .bind(&r.unit_name)
            .bind(&r.nutrient_nbr)
            .bind(r.rank)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn upsert_food(&mut self, r: &Food) -> Result<(), StoreError> {
        sqlx::query(UPSERT_FOOD)
            .bind(r.fdc_id)
            .bind(&r.data_type)
            .bind(&r.description)
            .bind(r.food_category_id)
            .bind(r.publication_date)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn upsert_food_nutrient(&mut self, r: &FoodNutrient) -> Result<(), StoreError> {
        sqlx::query(UPSERT_FOOD_NUTRIENT)
            .bind(r.id)
            .bind(r.fdc_id)
            .bind(r.nutrient_id)
            .bind(r.amount)
            .bind(r.data_points)
            .bind(r.derivation_id)
            .bind(r.min)
            .bind(r.max)
            .bind(r.median)
            .bind(r.loq)
            .bind(&r.footnote)
            .bind(r.min_year_acquired)
            .bind(r.percent_daily_value)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn upsert_food_portion(&mut self, r: &FoodPortion) -> Result<(), StoreError> {
        sqlx::query(UPSERT_FOOD_PORTION)
            .bind(r.id)
            .bind(r.fdc_id)
            .bind(r.seq_num)
            .bind(r.amount)
            .bind(r.measure_unit_id)
            .bind(&r.portion_description)
            .bind(&r.modifier)
            .bind(r.gram_weight)
            .bind(r.data_points)
            .bind(&r.footnote)
            .bind(r.min_year_acquired)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}

fn id_query(entity: Entity) -> Option<&'static str> {
    match entity {
        Entity::FoodCategory => Some("SELECT id FROM food_category"),
        Entity::MeasureUnit => Some("SELECT id FROM measure_unit"),
        Entity::Nutrient => Some("SELECT id FROM nutrient"),
        Entity::Food => Some("SELECT fdc_id FROM food"),
        Entity::FoodPortion => Some("SELECT id FROM food_portion"),
        // BIGINT ids, never referenced
        Entity::FoodNutrient => None,
    }
}

#[async_trait]
impl ReferenceStore for PgReferenceStore {
    async fn known_ids(&mut self, entity: Entity) -> Result<HashSet<i32>, StoreError> {
        let Some(query) = id_query(entity) else {
            return Ok(HashSet::new());
        };

        let ids: HashSet<i32> = sqlx::query_scalar::<_, i32>(query)
            .fetch(&mut *self.conn)
            .try_collect()
            .await?;

        debug!(entity = %entity, count = ids.len(), "Loaded known ids");
        Ok(ids)
    }

    async fn upsert(&mut self, record: &Record) -> Result<(), StoreError> {
        match record {
            Record::FoodCategory(r) => self.upsert_food_category(r).await,
            Record::MeasureUnit(r) => self.upsert_measure_unit(r).await,
            Record::Nutrient(r) => self.upsert_nutrient(r).await,
            Record::Food(r) => self.upsert_food(r).await,
            Record::FoodNutrient(r) => self.upsert_food_nutrient(r).await,
            Record::FoodPortion(r) => self.upsert_food_portion(r).await,
        }
    }

    async fn sync_servings(&mut self, update_existing: bool) -> Result<ServingStats, StoreError> {
        let query = if update_existing {
            SYNC_SERVINGS_UPDATE
        } else {
            SYNC_SERVINGS_INSERT_ONLY
        };

        let (created, updated): (i64, i64) = sqlx::query_as(query)
            .fetch_one(&mut *self.conn)
            .await?;

        let foods: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM food")
            .fetch_one(&mut *self.conn)
            .await?;

        let stats = ServingStats {
            created: created.max(0) as u64,
            updated: updated.max(0) as u64,
            untouched: (foods - created - updated).max(0) as u64,
        };
        info!(
            created = stats.created,
            updated = stats.updated,
            untouched = stats.untouched,
            "Synchronized food servings"
        );
        Ok(stats)
    }
}
