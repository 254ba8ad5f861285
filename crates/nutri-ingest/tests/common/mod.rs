//! Shared fixtures for the ingestion integration tests
//!
//! [`Fixture::clean`] is a small but complete reference dataset: 3 categories,
//! 2 units, 5 nutrients, 10 foods, 40 food nutrient values and 10 portions,
//! every reference resolvable. Tests edit the rows and write them to a
//! temporary directory.

#![allow(dead_code)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use nutri_ingest::{IngestConfig, MemoryStore, Pipeline, SourceResolver};
use nutri_ingest::{IngestResult, RunSummary};
use tempfile::TempDir;

pub const CATEGORY_HEADER: &str = "id,code,description";
pub const UNIT_HEADER: &str = "id,name";
pub const NUTRIENT_HEADER: &str = "id,name,unit_name,nutrient_nbr,rank";
pub const FOOD_HEADER: &str = "fdc_id,data_type,description,food_category_id,publication_date";
pub const FOOD_NUTRIENT_HEADER: &str =
    "id,fdc_id,nutrient_id,amount,data_points,derivation_id,min,max,median,footnote,min_year_acquired";
pub const PORTION_HEADER: &str =
    "id,fdc_id,seq_num,amount,measure_unit_id,portion_description,modifier,gram_weight,data_points,footnote,min_year_acquired";

pub const FIRST_FDC_ID: i32 = 100;
pub const FOOD_COUNT: i32 = 10;
pub const NUTRIENT_IDS: [i32; 5] = [1003, 1004, 1005, 1008, 1087];

#[derive(Debug, Clone)]
pub struct Fixture {
    pub categories: Vec<String>,
    pub units: Vec<String>,
    pub nutrients: Vec<String>,
    pub foods: Vec<String>,
    pub food_nutrients: Vec<String>,
    pub portions: Vec<String>,
}

impl Fixture {
    pub fn clean() -> Self {
        let categories = vec![
            "1,0100,Dairy and Egg Products".to_string(),
            "2,0200,Spices and Herbs".to_string(),
            "3,0900,Fruits and Fruit Juices".to_string(),
        ];

        let units = vec!["1000,cup".to_string(), "1001,tbsp".to_string()];

        let nutrients = vec![
            "1003,Protein,G,203,600".to_string(),
            "1004,Total lipid (fat),G,204,800".to_string(),
            "1005,\"Carbohydrate, by difference\",G,205,1110".to_string(),
            "1008,Energy,KCAL,208,300".to_string(),
            "1087,\"Calcium, Ca\",MG,301,5300".to_string(),
        ];

        let foods = (0..FOOD_COUNT)
            .map(|i| {
                let fdc_id = FIRST_FDC_ID + i;
                let category = i % 3 + 1;
                format!("{fdc_id},sr_legacy_food,Food number {i},{category},2019-04-01")
            })
            .collect();

        // four nutrient values per food
        let food_nutrients = (0..FOOD_COUNT)
            .flat_map(|i| {
                (0..4).map(move |k| {
                    let id = 5000 + i64::from(i) * 4 + k as i64;
                    let fdc_id = FIRST_FDC_ID + i;
                    let nutrient_id = NUTRIENT_IDS[(i as usize + k) % NUTRIENT_IDS.len()];
                    let amount = f64::from(i) + k as f64 / 10.0;
                    format!("{id},{fdc_id},{nutrient_id},{amount},1,1,,,,,")
                })
            })
            .collect();

        let portions = (0..FOOD_COUNT)
            .map(|i| {
                let id = 9000 + i;
                let fdc_id = FIRST_FDC_ID + i;
                let unit = if i % 2 == 0 { 1000 } else { 1001 };
                let grams = 10.0 + f64::from(i) * 5.5;
                format!("{id},{fdc_id},1,1,{unit},,,{grams},,,")
            })
            .collect();

        Self {
            categories,
            units,
            nutrients,
            foods,
            food_nutrients,
            portions,
        }
    }

    pub fn write(&self, dir: &Path) {
        write_csv(dir, "food_category.csv", CATEGORY_HEADER, &self.categories);
        write_csv(dir, "measure_unit.csv", UNIT_HEADER, &self.units);
        write_csv(dir, "nutrient.csv", NUTRIENT_HEADER, &self.nutrients);
        write_csv(dir, "food.csv", FOOD_HEADER, &self.foods);
        write_csv(dir, "food_nutrient.csv", FOOD_NUTRIENT_HEADER, &self.food_nutrients);
        write_csv(dir, "food_portion.csv", PORTION_HEADER, &self.portions);
    }

    pub fn write_to_temp(&self) -> TempDir {
        let dir = TempDir::new().expect("create temp dir");
        self.write(dir.path());
        dir
    }

    /// Replace the category of the food at `index`
    pub fn set_food_category(&mut self, index: usize, category: &str) {
        let fields: Vec<&str> = self.foods[index].split(',').collect();
        self.foods[index] = format!(
            "{},{},{},{},{}",
            fields[0], fields[1], fields[2], category, fields[4]
        );
    }

    /// Point the food nutrient value at `index` to another food
    pub fn set_food_nutrient_fdc_id(&mut self, index: usize, fdc_id: i32) {
        let mut fields: Vec<String> = self.food_nutrients[index].split(',').map(str::to_string).collect();
        fields[1] = fdc_id.to_string();
        self.food_nutrients[index] = fields.join(",");
    }
}

pub fn write_csv(dir: &Path, name: &str, header: &str, rows: &[String]) {
    let mut content = String::from(header);
    content.push('\n');
    for row in rows {
        content.push_str(row);
        content.push('\n');
    }
    fs::write(dir.join(name), content).expect("write fixture");
}

/// Append raw bytes to a written fixture file
pub fn append_bytes(dir: &Path, name: &str, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(dir.join(name)).expect("open fixture");
    file.write_all(bytes).expect("append fixture");
}

pub async fn run_memory(dir: &Path, config: IngestConfig, store: MemoryStore) -> (IngestResult<RunSummary>, MemoryStore) {
    let sources = SourceResolver::new(dir).resolve().expect("resolve sources");
    let mut pipeline = Pipeline::new(config, store, sources);
    let result = pipeline.run().await;
    (result, pipeline.into_store())
}

pub fn config_for(dir: &Path) -> IngestConfig {
    IngestConfig::new(dir)
}
