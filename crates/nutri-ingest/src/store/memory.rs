//! In-process reference store
//!
//! Mirrors the PostgreSQL schema's keys and foreign keys so that a dry run
//! rejects exactly the rows a real load would.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;

use super::ReferenceStore;
use crate::error::StoreError;
use crate::models::{
    Entity, Food, FoodCategory, FoodNutrient, FoodPortion, FoodServing, MeasureUnit, Nutrient, Record,
};
use crate::stats::ServingStats;

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    categories: BTreeMap<i32, FoodCategory>,
    units: BTreeMap<i32, MeasureUnit>,
    /// keyed by `nutrient_nbr`
    nutrients: BTreeMap<String, Nutrient>,
    nutrient_ids: HashSet<i32>,
    foods: BTreeMap<i32, Food>,
    food_nutrients: BTreeMap<i64, FoodNutrient>,
    portions: BTreeMap<i32, FoodPortion>,
    servings: BTreeMap<i32, FoodServing>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn categories(&self) -> impl Iterator<Item = &FoodCategory> {
        self.categories.values()
    }

    pub fn units(&self) -> impl Iterator<Item = &MeasureUnit> {
        self.units.values()
    }

    pub fn nutrients(&self) -> impl Iterator<Item = &Nutrient> {
        self.nutrients.values()
    }

    pub fn nutrient_by_nbr(&self, nutrient_nbr: &str) -> Option<&Nutrient> {
        self.nutrients.get(nutrient_nbr)
    }

    pub fn foods(&self) -> impl Iterator<Item = &Food> {
        self.foods.values()
    }

    pub fn food(&self, fdc_id: i32) -> Option<&Food> {
        self.foods.get(&fdc_id)
    }

    pub fn food_nutrients(&self) -> impl Iterator<Item = &FoodNutrient> {
        self.food_nutrients.values()
    }

    pub fn food_portions(&self) -> impl Iterator<Item = &FoodPortion> {
        self.portions.values()
    }

    pub fn servings(&self) -> impl Iterator<Item = &FoodServing> {
        self.servings.values()
    }

    pub fn serving(&self, fdc_id: i32) -> Option<&FoodServing> {
        self.servings.get(&fdc_id)
    }

    /// Row count of an entity's table
    pub fn count(&self, entity: Entity) -> usize {
        match entity {
            Entity::FoodCategory => self.categories.len(),
            Entity::MeasureUnit => self.units.len(),
            Entity::Nutrient => self.nutrients.len(),
            Entity::Food => self.foods.len(),
            Entity::FoodNutrient => self.food_nutrients.len(),
            Entity::FoodPortion => self.portions.len(),
        }
    }

    fn upsert_nutrient(&mut self, nutrient: &Nutrient) -> Result<(), StoreError> {
        if let Some(existing) = self.nutrients.get_mut(&nutrient.nutrient_nbr) {
            existing.name.clone_from(&nutrient.name);
            existing.unit_name.clone_from(&nutrient.unit_name);
            existing.rank = nutrient.rank;
            return Ok(());
        }
        if !self.nutrient_ids.insert(nutrient.id) {
            return Err(StoreError::constraint(format!(
                "duplicate nutrient id {}",
                nutrient.id
            )));
        }
        self.nutrients
            .insert(nutrient.nutrient_nbr.clone(), nutrient.clone());
        Ok(())
    }

    fn upsert_food(&mut self, food: &Food) -> Result<(), StoreError> {
        if let Some(category) = food.food_category_id {
            if !self.categories.contains_key(&category) {
                return Err(StoreError::constraint(format!(
                    "food_category {category} does not exist"
                )));
            }
        }
        self.foods.insert(food.fdc_id, food.clone());
        Ok(())
    }

    fn upsert_food_nutrient(&mut self, fact: &FoodNutrient) -> Result<(), StoreError> {
        if !self.foods.contains_key(&fact.fdc_id) {
            return Err(StoreError::constraint(format!("food {} does not exist", fact.fdc_id)));
        }
        if !self.nutrient_ids.contains(&fact.nutrient_id) {
            return Err(StoreError::constraint(format!(
                "nutrient {} does not exist",
                fact.nutrient_id
            )));
        }
        self.food_nutrients.insert(fact.id, fact.clone());
        Ok(())
    }

    fn upsert_food_portion(&mut self, portion: &FoodPortion) -> Result<(), StoreError> {
        if !self.foods.contains_key(&portion.fdc_id) {
            return Err(StoreError::constraint(format!(
                "food {} does not exist",
                portion.fdc_id
            )));
        }
        if let Some(unit) = portion.measure_unit_id {
            if !self.units.contains_key(&unit) {
                return Err(StoreError::constraint(format!(
                    "measure_unit {unit} does not exist"
                )));
            }
        }
        self.portions.insert(portion.id, portion.clone());
        Ok(())
    }
}

#[async_trait]
impl ReferenceStore for MemoryStore {
    async fn known_ids(&mut self, entity: Entity) -> Result<HashSet<i32>, StoreError> {
        let ids = match entity {
            Entity::FoodCategory => self.categories.keys().copied().collect(),
            Entity::MeasureUnit => self.units.keys().copied().collect(),
            Entity::Nutrient => self.nutrient_ids.clone(),
            Entity::Food => self.foods.keys().copied().collect(),
            Entity::FoodPortion => self.portions.keys().copied().collect(),
            Entity::FoodNutrient => HashSet::new(),
        };
        Ok(ids)
    }

    async fn upsert(&mut self, record: &Record) -> Result<(), StoreError> {
        match record {
            Record::FoodCategory(r) => {
                self.categories.insert(r.id, r.clone());
                Ok(())
            },
            Record::MeasureUnit(r) => {
                self.units.insert(r.id, r.clone());
                Ok(())
            },
            Record::Nutrient(r) => self.upsert_nutrient(r),
            Record::Food(r) => self.upsert_food(r),
            Record::FoodNutrient(r) => self.upsert_food_nutrient(r),
            Record::FoodPortion(r) => self.upsert_food_portion(r),
        }
    }

    async fn sync_servings(&mut self, update_existing: bool) -> Result<ServingStats, StoreError> {
        let mut by_food: BTreeMap<i32, Vec<&FoodPortion>> = BTreeMap::new();
        for portion in self.portions.values() {
            by_food.entry(portion.fdc_id).or_default().push(portion);
        }

        let mut stats = ServingStats::default();
        for food in self.foods.values() {
            let portions = by_food.get(&food.fdc_id).map(Vec::as_slice).unwrap_or_default();
            let exists = self.servings.contains_key(&food.fdc_id);

            if exists && !update_existing {
                stats.untouched += 1;
                continue;
            }

            let serving = FoodServing::synthesize(food, portions.iter().copied());
            self.servings.insert(food.fdc_id, serving);
            if exists {
                stats.updated += 1;
            } else {
                stats.created += 1;
            }
        }

        Ok(stats)
    }
}
