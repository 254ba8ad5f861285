//! Stage graph
//!
//! A stage loads one dataset into one entity table. The plan is an ordered
//! list of stages; it is rejected at construction if any stage depends on an
//! entity that no earlier stage loads.

use std::collections::HashSet;

use crate::error::{IngestError, IngestResult};
use crate::models::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub entity: Entity,
    /// File stem of the source
    pub dataset: &'static str,
    pub depends_on: &'static [Entity],
}

impl Stage {
    pub fn for_entity(entity: Entity) -> Self {
        Self {
            entity,
            dataset: entity.as_str(),
            depends_on: entity.references(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    pub fn new(stages: Vec<Stage>) -> IngestResult<Self> {
        let mut seen = HashSet::new();

        for stage in &stages {
            if let Some(missing) = stage.depends_on.iter().find(|dep| !seen.contains(*dep)) {
                return Err(IngestError::Plan(format!(
                    "{} depends on {}, which is not loaded by an earlier stage",
                    stage.entity, missing
                )));
            }
            if !seen.insert(stage.entity) {
                return Err(IngestError::Plan(format!("{} is loaded twice", stage.entity)));
            }
        }

        Ok(Self { stages })
    }

    /// The six reference stages in load order
    pub fn reference_dataset() -> Self {
        Self {
            stages: Entity::ALL.into_iter().map(Stage::for_entity).collect(),
        }
    }

    #[cfg(test)]
    pub(crate) fn unchecked(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn datasets(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.stages.iter().map(|s| s.dataset)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
