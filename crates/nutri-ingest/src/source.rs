//! Source file resolution
//!
//! A dataset download usually unpacks into dated release folders, e.g.
//! `data/FoodData_Central_csv_2023-10-26/food.csv` next to
//! `data/FoodData_Central_csv_2024-04-18/food.csv`. The resolver walks the
//! whole tree and keeps one path per dataset name (file stem): a path inside
//! the preferred release folder wins, otherwise the last one scanned wins.
//! Entries are visited in file-name order, so later dated folders come last.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{IngestError, IngestResult};

const DELIMITED_EXTENSIONS: &[&str] = &["csv", "tsv"];

/// Dataset name to resolved file
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    root: PathBuf,
    files: HashMap<String, PathBuf>,
}

impl SourceMap {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: HashMap::new(),
        }
    }

    pub fn insert(&mut self, dataset: impl Into<String>, path: impl Into<PathBuf>) {
        self.files.insert(dataset.into(), path.into());
    }

    pub fn get(&self, dataset: &str) -> Option<&Path> {
        self.files.get(dataset).map(PathBuf::as_path)
    }

    /// Path for a dataset the caller cannot do without
    pub fn require(&self, dataset: &str) -> IngestResult<&Path> {
        self.get(dataset).ok_or_else(|| IngestError::MissingSource {
            dataset: dataset.to_string(),
            root: self.root.clone(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Locates delimited source files under a root directory
#[derive(Debug, Clone)]
pub struct SourceResolver {
    root: PathBuf,
    preferred: Option<String>,
}

impl SourceResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            preferred: None,
        }
    }

    /// Folder name whose files win ties; inferred from dated folders when unset
    pub fn prefer(mut self, folder: Option<String>) -> Self {
        self.preferred = folder;
        self
    }

    pub fn resolve(&self) -> IngestResult<SourceMap> {
        if !self.root.is_dir() {
            return Err(IngestError::SourceRoot(self.root.clone()));
        }

        let preferred = match &self.preferred {
            Some(folder) => Some(folder.clone()),
            None => self.latest_release()?,
        };
        if let Some(folder) = &preferred {
            info!(root = %self.root.display(), release = %folder, "Preferring release folder");
        }

        let mut files: HashMap<String, (PathBuf, bool)> = HashMap::new();
        for entry in self.walk() {
            let entry = entry.map_err(|source| IngestError::Scan {
                root: self.root.clone(),
                source,
            })?;
            if !entry.file_type().is_file() || !is_delimited(entry.path()) {
                continue;
            }
            let Some(dataset) = entry.path().file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let in_preferred = preferred
                .as_deref()
                .is_some_and(|folder| self.under_folder(entry.path(), folder));

            match files.get(dataset) {
                Some((kept, true)) if !in_preferred => {
                    debug!(
                        dataset,
                        kept = %kept.display(),
                        ignored = %entry.path().display(),
                        "Keeping file from preferred release"
                    );
                },
                _ => {
                    files.insert(dataset.to_string(), (entry.path().to_path_buf(), in_preferred));
                },
            }
        }

        let mut map = SourceMap::new(&self.root);
        for (dataset, (path, _)) in files {
            debug!(dataset = %dataset, path = %path.display(), "Resolved source");
            map.insert(dataset, path);
        }

        info!(root = %self.root.display(), datasets = map.len(), "Resolved source files");
        Ok(map)
    }

    fn walk(&self) -> walkdir::IntoIter {
        WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
    }

    fn under_folder(&self, path: &Path, folder: &str) -> bool {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .parent()
            .is_some_and(|dir| dir.components().any(|c| c.as_os_str() == folder))
    }

    /// Directory name carrying the latest ISO date, if any
    fn latest_release(&self) -> IngestResult<Option<String>> {
        let mut latest: Option<(NaiveDate, String)> = None;

        for entry in self.walk() {
            let entry = entry.map_err(|source| IngestError::Scan {
                root: self.root.clone(),
                source,
            })?;
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if let Some(date) = release_date(name) {
                if latest.as_ref().map_or(true, |(best, _)| date >= *best) {
                    latest = Some((date, name.to_string()));
                }
            }
        }

        Ok(latest.map(|(_, name)| name))
    }
}

fn is_delimited(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| DELIMITED_EXTENSIONS.iter().any(|d| ext.eq_ignore_ascii_case(d)))
}

/// First `YYYY-MM-DD` date embedded in a folder name
fn release_date(name: &str) -> Option<NaiveDate> {
    let bytes = name.as_bytes();
    (0..bytes.len().saturating_sub(9))
        .filter(|&i| name.is_char_boundary(i) && name.is_char_boundary(i + 10))
        .find_map(|i| NaiveDate::parse_from_str(&name[i..i + 10], "%Y-%m-%d").ok())
}
