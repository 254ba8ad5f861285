//! Reference dataset entities
//!
//! Six tables, loaded in dependency order:
//! `food_category`, `measure_unit`, `nutrient`, `food`, `food_nutrient`,
//! `food_portion`. Each struct maps one source row; column names follow the
//! snake_case headers of the source files.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::decoder::{FieldError, FromRow, Row};

/// The six reference entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    FoodCategory,
    MeasureUnit,
    Nutrient,
    Food,
    FoodNutrient,
    FoodPortion,
}

impl Entity {
    /// Every entity in load order
    pub const ALL: [Entity; 6] = [
        Entity::FoodCategory,
        Entity::MeasureUnit,
        Entity::Nutrient,
        Entity::Food,
        Entity::FoodNutrient,
        Entity::FoodPortion,
    ];

    /// Table name, also the dataset (file stem) name
    pub fn as_str(self) -> &'static str {
        match self {
            Entity::FoodCategory => "food_category",
            Entity::MeasureUnit => "measure_unit",
            Entity::Nutrient => "nutrient",
            Entity::Food => "food",
            Entity::FoodNutrient => "food_nutrient",
            Entity::FoodPortion => "food_portion",
        }
    }

    /// Entities whose identifiers this entity's records point at
    pub fn references(self) -> &'static [Entity] {
        match self {
            Entity::FoodCategory | Entity::MeasureUnit | Entity::Nutrient => &[],
            Entity::Food => &[Entity::FoodCategory],
            Entity::FoodNutrient => &[Entity::Food, Entity::Nutrient],
            Entity::FoodPortion => &[Entity::Food, Entity::MeasureUnit],
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Entity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Entity::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown entity '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodCategory {
    pub id: i32,
    pub code: Option<String>,
    pub description: String,
}

impl FromRow for FoodCategory {
    const REQUIRED_COLUMNS: &'static [&'static str] = &["id", "description"];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            id: row.required_i32("id")?,
            code: row.optional_text("code"),
            description: row.text("description"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureUnit {
    pub id: i32,
    pub name: String,
}

impl FromRow for MeasureUnit {
    const REQUIRED_COLUMNS: &'static [&'static str] = &["id", "name"];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            id: row.required_i32("id")?,
            name: row.text("name"),
        })
    }
}

/// A nutrient definition, keyed by its nutrient number rather than `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrient {
    pub id: i32,
    pub name: String,
    pub unit_name: Option<String>,
    /// Natural key, e.g. "208" for energy in kcal
    pub nutrient_nbr: String,
    pub rank: Option<f64>,
}

impl FromRow for Nutrient {
    const REQUIRED_COLUMNS: &'static [&'static str] = &["id", "name", "nutrient_nbr"];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            id: row.required_i32("id")?,
            name: row.text("name"),
            unit_name: row.optional_text("unit_name"),
            nutrient_nbr: row.required_text("nutrient_nbr")?,
            rank: row.optional_f64("rank"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Food {
    pub fdc_id: i32,
    pub data_type: String,
    pub description: String,
    /// Optional: nulled when it does not resolve to a loaded category
    pub food_category_id: Option<i32>,
    pub publication_date: Option<NaiveDate>,
}

impl FromRow for Food {
    const REQUIRED_COLUMNS: &'static [&'static str] = &["fdc_id", "description"];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            fdc_id: row.required_i32("fdc_id")?,
            data_type: row.text("data_type"),
            description: row.text("description"),
            food_category_id: row.optional_i32("food_category_id"),
            publication_date: row.optional_date("publication_date"),
        })
    }
}

/// One measured nutrient amount for one food
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodNutrient {
    pub id: i64,
    /// Required: the record is dropped when the food is unknown
    pub fdc_id: i32,
    /// Required: the record is dropped when the nutrient is unknown
    pub nutrient_id: i32,
    pub amount: Option<f64>,
    pub data_points: Option<i32>,
    pub derivation_id: Option<i32>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub median: Option<f64>,
    pub loq: Option<f64>,
    pub footnote: Option<String>,
    pub min_year_acquired: Option<i32>,
    pub percent_daily_value: Option<f64>,
}

impl FromRow for FoodNutrient {
    const REQUIRED_COLUMNS: &'static [&'static str] = &["id", "fdc_id", "nutrient_id", "amount"];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            id: row.required_i64("id")?,
            fdc_id: row.required_i32("fdc_id")?,
            nutrient_id: row.required_i32("nutrient_id")?,
            amount: row.optional_f64("amount"),
            data_points: row.optional_i32("data_points"),
            derivation_id: row.optional_i32("derivation_id"),
            min: row.optional_f64("min"),
            max: row.optional_f64("max"),
            median: row.optional_f64("median"),
            loq: row.optional_f64("loq"),
            footnote: row.optional_text("footnote"),
            min_year_acquired: row.optional_i32("min_year_acquired"),
            percent_daily_value: row.optional_f64("percent_daily_value"),
        })
    }
}

/// A serving-size portion of a food
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodPortion {
    pub id: i32,
    /// Required: the record is dropped when the food is unknown
    pub fdc_id: i32,
    pub seq_num: Option<i32>,
    pub amount: Option<f64>,
    /// Optional: nulled when it does not resolve to a loaded unit
    pub measure_unit_id: Option<i32>,
    pub portion_description: Option<String>,
    pub modifier: Option<String>,
    pub gram_weight: Option<f64>,
    pub data_points: Option<i32>,
    pub footnote: Option<String>,
    pub min_year_acquired: Option<i32>,
}

impl FromRow for FoodPortion {
    const REQUIRED_COLUMNS: &'static [&'static str] = &["id", "fdc_id"];

    fn from_row(row: &Row<'_>) -> Result<Self, FieldError> {
        Ok(Self {
            id: row.required_i32("id")?,
            fdc_id: row.required_i32("fdc_id")?,
            seq_num: row.optional_i32("seq_num"),
            amount: row.optional_f64("amount"),
            measure_unit_id: row.optional_i32("measure_unit_id"),
            portion_description: row.optional_text("portion_description"),
            modifier: row.optional_text("modifier"),
            gram_weight: row.optional_f64("gram_weight"),
            data_points: row.optional_i32("data_points"),
            footnote: row.optional_text("footnote"),
            min_year_acquired: row.optional_i32("min_year_acquired"),
        })
    }
}

/// Simplified single-serving record kept in the application's `food_serving` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodServing {
    pub fdc_id: i32,
    pub name: String,
    pub serving_size: f64,
    pub serving_unit: String,
}

impl FoodServing {
    /// Serving size used when a food has no portion with a gram weight
    pub const DEFAULT_SERVING_GRAMS: f64 = 100.0;

    /// Build from a food and its portions: the lowest `seq_num` portion with
    /// a positive gram weight wins
    pub fn synthesize<'a>(food: &Food, portions: impl IntoIterator<Item = &'a FoodPortion>) -> Self {
        let serving_size = portions
            .into_iter()
            .filter(|p| p.fdc_id == food.fdc_id)
            .filter_map(|p| p.gram_weight.filter(|g| *g > 0.0).map(|g| (p.seq_num, p.id, g)))
            .min_by_key(|(seq, id, _)| (seq.is_none(), *seq, *id))
            .map(|(_, _, grams)| grams)
            .unwrap_or(Self::DEFAULT_SERVING_GRAMS);

        Self {
            fdc_id: food.fdc_id,
            name: food.description.clone(),
            serving_size,
            serving_unit: "g".to_string(),
        }
    }
}

/// Any decoded entity, ready to upsert
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    FoodCategory(FoodCategory),
    MeasureUnit(MeasureUnit),
    Nutrient(Nutrient),
    Food(Food),
    FoodNutrient(FoodNutrient),
    FoodPortion(FoodPortion),
}

impl Record {
    pub fn entity(&self) -> Entity {
        match self {
            Record::FoodCategory(_) => Entity::FoodCategory,
            Record::MeasureUnit(_) => Entity::MeasureUnit,
            Record::Nutrient(_) => Entity::Nutrient,
            Record::Food(_) => Entity::Food,
            Record::FoodNutrient(_) => Entity::FoodNutrient,
            Record::FoodPortion(_) => Entity::FoodPortion,
        }
    }

    /// Upsert key, rendered for logs
    pub fn key(&self) -> String {
        match self {
            Record::FoodCategory(r) => format!("id={}", r.id),
            Record::MeasureUnit(r) => format!("id={}", r.id),
            Record::Nutrient(r) => format!("nutrient_nbr={}", r.nutrient_nbr),
            Record::Food(r) => format!("fdc_id={}", r.fdc_id),
            Record::FoodNutrient(r) => format!("id={}", r.id),
            Record::FoodPortion(r) => format!("id={}", r.id),
        }
    }
}

macro_rules! impl_into_record {
    ($($entity:ident),+ $(,)?) => {
        $(
            impl From<$entity> for Record {
                fn from(record: $entity) -> Self {
                    Record::$entity(record)
                }
            }
        )+
    };
}

impl_into_record!(FoodCategory, MeasureUnit, Nutrient, Food, FoodNutrient, FoodPortion);
