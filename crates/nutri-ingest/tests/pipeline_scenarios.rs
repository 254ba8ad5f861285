//! End-to-end load scenarios over the in-memory store

mod common;

use std::collections::HashSet;
use std::fs;

use common::{append_bytes, config_for, run_memory, Fixture, FIRST_FDC_ID, FOOD_COUNT};
use nutri_ingest::{Entity, ErrorPolicy, IngestError, MemoryStore};

#[tokio::test]
async fn test_clean_load_inserts_everything() {
    let dir = Fixture::clean().write_to_temp();

    let (result, store) = run_memory(dir.path(), config_for(dir.path()), MemoryStore::new()).await;
    let summary = result.unwrap();

    assert_eq!(summary.total_inserted(), 70);
    assert_eq!(summary.total_filtered(), 0);
    assert_eq!(summary.total_adjusted(), 0);
    assert_eq!(summary.total_failed(), 0);
    assert_eq!(summary.total_skipped(), 0);

    let expected = [
        (Entity::FoodCategory, 3),
        (Entity::MeasureUnit, 2),
        (Entity::Nutrient, 5),
        (Entity::Food, 10),
        (Entity::FoodNutrient, 40),
        (Entity::FoodPortion, 10),
    ];
    for (entity, count) in expected {
        assert_eq!(summary.stage(entity).unwrap().inserted, count, "{entity} inserted");
        assert_eq!(store.count(entity), count as usize, "{entity} stored");
    }
}

#[tokio::test]
async fn test_dangling_category_is_nulled() {
    let mut fixture = Fixture::clean();
    fixture.set_food_category(0, "99");
    fixture.set_food_category(1, "42");
    let dir = fixture.write_to_temp();

    let (result, store) = run_memory(dir.path(), config_for(dir.path()), MemoryStore::new()).await;
    let summary = result.unwrap();

    let food = summary.stage(Entity::Food).unwrap();
    assert_eq!(food.inserted, 10);
    assert_eq!(food.adjusted, 2);
    assert_eq!(food.filtered, 0);

    let uncategorized: Vec<i32> = store
        .foods()
        .filter(|f| f.food_category_id.is_none())
        .map(|f| f.fdc_id)
        .collect();
    assert_eq!(uncategorized, vec![FIRST_FDC_ID, FIRST_FDC_ID + 1]);
}

#[tokio::test]
async fn test_dangling_food_drops_nutrient_value() {
    let mut fixture = Fixture::clean();
    for index in [0, 7, 13, 22, 39] {
        fixture.set_food_nutrient_fdc_id(index, 777_777);
    }
    let dir = fixture.write_to_temp();

    let (result, store) = run_memory(dir.path(), config_for(dir.path()), MemoryStore::new()).await;
    let summary = result.unwrap();

    let facts = summary.stage(Entity::FoodNutrient).unwrap();
    assert_eq!(facts.inserted, 35);
    assert_eq!(facts.filtered, 5);
    assert_eq!(facts.adjusted, 0);
    assert!(store.food_nutrients().all(|f| f.fdc_id != 777_777));
    assert_eq!(store.count(Entity::FoodNutrient), 35);
}

#[tokio::test]
async fn test_truncated_food_stage_keeps_integrity() {
    let mut fixture = Fixture::clean();
    fixture.foods.truncate(6);
    let dir = fixture.write_to_temp();

    let (result, store) = run_memory(dir.path(), config_for(dir.path()), MemoryStore::new()).await;
    let summary = result.unwrap();

    assert_eq!(summary.stage(Entity::Food).unwrap().inserted, 6);
    assert_eq!(summary.stage(Entity::FoodNutrient).unwrap().filtered, 16);
    assert_eq!(summary.stage(Entity::FoodPortion).unwrap().filtered, 4);

    let foods: HashSet<i32> = store.foods().map(|f| f.fdc_id).collect();
    assert!(store.food_nutrients().all(|f| foods.contains(&f.fdc_id)));
    assert!(store.food_portions().all(|p| foods.contains(&p.fdc_id)));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let dir = Fixture::clean().write_to_temp();

    let (first, store) = run_memory(dir.path(), config_for(dir.path()), MemoryStore::new()).await;
    let first = first.unwrap();
    let foods_after_first: Vec<_> = store.foods().cloned().collect();
    let facts_after_first: Vec<_> = store.food_nutrients().cloned().collect();

    let (second, store) = run_memory(dir.path(), config_for(dir.path()), store).await;
    let second = second.unwrap();

    for (a, b) in first.stages.iter().zip(&second.stages) {
        assert_eq!(a.entity, b.entity);
        assert_eq!(a.inserted, b.inserted, "{} inserted", a.entity);
    }
    assert_eq!(store.foods().cloned().collect::<Vec<_>>(), foods_after_first);
    assert_eq!(store.food_nutrients().cloned().collect::<Vec<_>>(), facts_after_first);
}

#[tokio::test]
async fn test_rerun_updates_nutrient_name_in_place() {
    let mut fixture = Fixture::clean();
    let dir = fixture.write_to_temp();

    let (result, store) = run_memory(dir.path(), config_for(dir.path()), MemoryStore::new()).await;
    result.unwrap();
    assert_eq!(store.nutrient_by_nbr("203").unwrap().name, "Protein");

    fixture.nutrients[0] = "1003,Protein (N x 6.25),G,203,600".to_string();
    fixture.write(dir.path());

    let (result, store) = run_memory(dir.path(), config_for(dir.path()), store).await;
    result.unwrap();

    assert_eq!(store.count(Entity::Nutrient), 5);
    let protein = store.nutrient_by_nbr("203").unwrap();
    assert_eq!(protein.id, 1003);
    assert_eq!(protein.name, "Protein (N x 6.25)");
}

#[tokio::test]
async fn test_missing_source_fails_before_loading() {
    let dir = Fixture::clean().write_to_temp();
    fs::remove_file(dir.path().join("food_portion.csv")).unwrap();

    let (result, store) = run_memory(dir.path(), config_for(dir.path()), MemoryStore::new()).await;

    match result.unwrap_err() {
        IngestError::MissingSource { dataset, .. } => assert_eq!(dataset, "food_portion"),
        other => panic!("expected missing source, got {other:?}"),
    }
    assert_eq!(store.count(Entity::FoodCategory), 0);
}

#[tokio::test]
async fn test_malformed_key_aborts_but_keeps_earlier_stages() {
    let mut fixture = Fixture::clean();
    fixture.foods[2] = "abc,sr_legacy_food,Broken,1,2019-04-01".to_string();
    let dir = fixture.write_to_temp();

    let (result, store) = run_memory(dir.path(), config_for(dir.path()), MemoryStore::new()).await;

    match result.unwrap_err() {
        IngestError::Decode {
            dataset, line, column, ..
        } => {
            assert_eq!(dataset, "food");
            assert_eq!(line, 4);
            assert_eq!(column, "fdc_id");
        },
        other => panic!("expected decode error, got {other:?}"),
    }

    assert_eq!(store.count(Entity::Nutrient), 5);
    assert_eq!(store.count(Entity::Food), 2);
    assert_eq!(store.count(Entity::FoodNutrient), 0);
}

#[tokio::test]
async fn test_lenient_policy_counts_rejected_records() {
    let mut fixture = Fixture::clean();
    // same id as Protein, different number
    fixture.nutrients.push("1003,Nitrogen,G,202,500".to_string());
    let dir = fixture.write_to_temp();

    let (result, store) = run_memory(dir.path(), config_for(dir.path()), MemoryStore::new()).await;
    let summary = result.unwrap();

    let nutrients = summary.stage(Entity::Nutrient).unwrap();
    assert_eq!(nutrients.inserted, 5);
    assert_eq!(nutrients.failed, 1);
    assert!(store.nutrient_by_nbr("202").is_none());
    assert_eq!(summary.total_inserted(), 70);
}

#[tokio::test]
async fn test_every_rejected_record_is_counted_past_the_log_limit() {
    let mut fixture = Fixture::clean();
    for nbr in 900..915 {
        fixture.nutrients.push(format!("1003,Duplicate {nbr},G,{nbr},"));
    }
    let dir = fixture.write_to_temp();

    let (result, store) = run_memory(dir.path(), config_for(dir.path()), MemoryStore::new()).await;
    let summary = result.unwrap();

    let nutrients = summary.stage(Entity::Nutrient).unwrap();
    assert_eq!(nutrients.inserted, 5);
    assert_eq!(nutrients.failed, 15);
    assert_eq!(store.count(Entity::Nutrient), 5);
    assert_eq!(summary.total_inserted(), 70);
}

#[tokio::test]
async fn test_strict_policy_stops_at_rejected_record() {
    let mut fixture = Fixture::clean();
    fixture.nutrients.push("1003,Nitrogen,G,202,500".to_string());
    let dir = fixture.write_to_temp();

    let config = config_for(dir.path()).with_error_policy(ErrorPolicy::Strict);
    let (result, store) = run_memory(dir.path(), config, MemoryStore::new()).await;

    assert!(matches!(
        result.unwrap_err(),
        IngestError::Record {
            entity: Entity::Nutrient,
            ..
        }
    ));
    assert_eq!(store.count(Entity::Food), 0);
}

#[tokio::test]
async fn test_limit_caps_every_stage() {
    let dir = Fixture::clean().write_to_temp();

    let config = config_for(dir.path()).with_limit(Some(3));
    let (result, store) = run_memory(dir.path(), config, MemoryStore::new()).await;
    let summary = result.unwrap();

    for stage in &summary.stages {
        assert!(stage.processed() <= 3, "{} processed {}", stage.entity, stage.processed());
    }
    assert_eq!(store.count(Entity::Food), 3);
}

#[tokio::test]
async fn test_unparsable_optional_field_is_coerced() {
    let mut fixture = Fixture::clean();
    fixture.foods[4] = format!("{},sr_legacy_food,Odd date,1,someday", FIRST_FDC_ID + 4);
    let dir = fixture.write_to_temp();

    let (result, store) = run_memory(dir.path(), config_for(dir.path()), MemoryStore::new()).await;
    let summary = result.unwrap();

    assert_eq!(summary.stage(Entity::Food).unwrap().coerced, 1);
    assert_eq!(store.food(FIRST_FDC_ID + 4).unwrap().publication_date, None);
}

#[tokio::test]
async fn test_serving_sync() {
    let mut fixture = Fixture::clean();
    // last food loses its portion
    fixture.portions.pop();
    let dir = fixture.write_to_temp();

    let config = config_for(dir.path()).with_servings(true, false);
    let (result, store) = run_memory(dir.path(), config.clone(), MemoryStore::new()).await;
    let servings = result.unwrap().servings.unwrap();

    assert_eq!(servings.created, FOOD_COUNT as u64);
    assert_eq!(servings.updated, 0);
    assert_eq!(store.serving(FIRST_FDC_ID).unwrap().serving_size, 10.0);
    assert_eq!(store.serving(FIRST_FDC_ID + 1).unwrap().serving_size, 15.5);

    let last = store.serving(FIRST_FDC_ID + FOOD_COUNT - 1).unwrap();
    assert_eq!(last.serving_size, 100.0);
    assert_eq!(last.serving_unit, "g");
    assert_eq!(last.name, format!("Food number {}", FOOD_COUNT - 1));

    let (result, store) = run_memory(dir.path(), config, store).await;
    let servings = result.unwrap().servings.unwrap();
    assert_eq!((servings.created, servings.updated, servings.untouched), (0, 0, 10));

    let config = config_for(dir.path()).with_servings(true, true);
    let (result, _) = run_memory(dir.path(), config, store).await;
    let servings = result.unwrap().servings.unwrap();
    assert_eq!((servings.created, servings.updated, servings.untouched), (0, 10, 0));
}

#[tokio::test]
async fn test_latin1_footnote_is_coerced_not_fatal() {
    let dir = Fixture::clean().write_to_temp();
    append_bytes(
        dir.path(),
        "food_nutrient.csv",
        b"6000,100,1003,1.5,1,1,,,,caf\xe9 note,\n",
    );

    let (result, store) = run_memory(dir.path(), config_for(dir.path()), MemoryStore::new()).await;
    let summary = result.unwrap();

    let facts = summary.stage(Entity::FoodNutrient).unwrap();
    assert_eq!(facts.inserted, 41);
    assert_eq!(facts.coerced, 1);
    let fact = store.food_nutrients().find(|f| f.id == 6000).unwrap();
    assert_eq!(fact.footnote, None);
    assert_eq!(fact.amount, Some(1.5));

    assert_eq!(summary.stage(Entity::FoodPortion).unwrap().inserted, 10);
}
