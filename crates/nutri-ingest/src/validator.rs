//! Reference validation
//!
//! Before a stage starts, the identifier sets of every entity it references
//! are read from the store once. Each record is then checked with hash-set
//! lookups:
//!
//! - an optional reference that does not resolve is set to null and the
//!   record is kept (counted as adjusted)
//! - a required reference that does not resolve drops the record (counted as
//!   filtered)

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::models::{Entity, Food, FoodCategory, FoodNutrient, FoodPortion, MeasureUnit, Nutrient};

/// Identifiers already persisted, per referenced entity
#[derive(Debug, Clone, Default)]
pub struct KnownIds {
    ids: HashMap<Entity, HashSet<i32>>,
}

impl KnownIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Entity, ids: HashSet<i32>) {
        self.ids.insert(entity, ids);
    }

    pub fn with(mut self, entity: Entity, ids: impl IntoIterator<Item = i32>) -> Self {
        self.ids.insert(entity, ids.into_iter().collect());
        self
    }

    /// An entity that was never loaded resolves nothing
    pub fn contains(&self, entity: Entity, id: i32) -> bool {
        self.ids.get(&entity).is_some_and(|ids| ids.contains(&id))
    }

    pub fn len(&self, entity: Entity) -> usize {
        self.ids.get(&entity).map_or(0, HashSet::len)
    }

    pub fn is_loaded(&self, entity: Entity) -> bool {
        self.ids.contains_key(&entity)
    }
}

/// Outcome of checking one record's references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every reference resolved
    Clean,
    /// At least one optional reference was nulled
    Adjusted,
    /// A required reference did not resolve
    Dropped { entity: Entity, id: i32 },
}

/// Records that carry references to earlier entities
pub trait ReferenceCheck {
    /// Null unresolved optional references in place, or report a drop
    fn check_references(&mut self, known: &KnownIds) -> Verdict;
}

impl ReferenceCheck for FoodCategory {
    fn check_references(&mut self, _known: &KnownIds) -> Verdict {
        Verdict::Clean
    }
}

impl ReferenceCheck for MeasureUnit {
    fn check_references(&mut self, _known: &KnownIds) -> Verdict {
        Verdict::Clean
    }
}

impl ReferenceCheck for Nutrient {
    fn check_references(&mut self, _known: &KnownIds) -> Verdict {
        Verdict::Clean
    }
}

impl ReferenceCheck for Food {
    fn check_references(&mut self, known: &KnownIds) -> Verdict {
        match self.food_category_id {
            Some(id) if !known.contains(Entity::FoodCategory, id) => {
                self.food_category_id = None;
                Verdict::Adjusted
            },
            _ => Verdict::Clean,
        }
    }
}

impl ReferenceCheck for FoodNutrient {
    fn check_references(&mut self, known: &KnownIds) -> Verdict {
        if !known.contains(Entity::Food, self.fdc_id) {
            return Verdict::Dropped {
                entity: Entity::Food,
                id: self.fdc_id,
            };
        }
        if !known.contains(Entity::Nutrient, self.nutrient_id) {
            return Verdict::Dropped {
                entity: Entity::Nutrient,
                id: self.nutrient_id,
            };
        }
        Verdict::Clean
    }
}

impl ReferenceCheck for FoodPortion {
    fn check_references(&mut self, known: &KnownIds) -> Verdict {
        // a dropped record is not also counted as adjusted
        if !known.contains(Entity::Food, self.fdc_id) {
            return Verdict::Dropped {
                entity: Entity::Food,
                id: self.fdc_id,
            };
        }
        match self.measure_unit_id {
            Some(id) if !known.contains(Entity::MeasureUnit, id) => {
                self.measure_unit_id = None;
                Verdict::Adjusted
            },
            _ => Verdict::Clean,
        }
    }
}

/// Applies reference checks across one stage and keeps the counts
#[derive(Debug)]
pub struct ReferenceValidator {
    entity: Entity,
    known: KnownIds,
    adjusted: u64,
    filtered: u64,
}

impl ReferenceValidator {
    pub fn new(entity: Entity, known: KnownIds) -> Self {
        Self {
            entity,
            known,
            adjusted: 0,
            filtered: 0,
        }
    }

    /// The record to load, or `None` when it has to be dropped
    pub fn validate<T: ReferenceCheck>(&mut self, mut record: T) -> Option<T> {
        match record.check_references(&self.known) {
            Verdict::Clean => Some(record),
            Verdict::Adjusted => {
                self.adjusted += 1;
                Some(record)
            },
            Verdict::Dropped { entity, id } => {
                debug!(
                    stage = %self.entity,
                    missing = %entity,
                    id,
                    "Dropping record with unresolved required reference"
                );
                self.filtered += 1;
                None
            },
        }
    }

    pub fn adjusted(&self) -> u64 {
        self.adjusted
    }

    pub fn filtered(&self) -> u64 {
        self.filtered
    }
}
