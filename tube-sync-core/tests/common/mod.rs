#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use tube_sync_core::contract::{Clock, DatasetStore};
use tube_sync_core::dataset::{Dataset, Row};
use tube_sync_core::error::DatasetError;
use tube_sync_core::locale::Locale;

pub const SITE: &str = "https://shop.example";

/// Clock pinned to a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    pub fn on(year: i32, month: u32, day: u32) -> Self {
        FixedClock(
            NaiveDate::from_ymd_opt(year, month, day)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        )
    }

    pub fn today(&self) -> NaiveDate {
        self.0.date()
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Dataset store kept in memory; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    datasets: Arc<Mutex<HashMap<String, Dataset>>>,
    saves: Arc<AtomicUsize>,
    fail_saves: bool,
}

impl MemoryStore {
    pub fn with(datasets: Vec<Dataset>) -> Self {
        let store = Self::default();
        for ds in datasets {
            store.datasets.lock().unwrap().insert(ds.locale.code.clone(), ds);
        }
        store
    }

    pub fn failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    pub fn dataset(&self, locale: &str) -> Dataset {
        self.datasets.lock().unwrap()[locale].clone()
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl DatasetStore for MemoryStore {
    fn discover_locales(&self) -> Result<Vec<Locale>, DatasetError> {
        Ok(self
            .datasets
            .lock()
            .unwrap()
            .values()
            .map(|d| d.locale.clone())
            .collect())
    }

    fn load(&self, locale: &Locale) -> Result<Dataset, DatasetError> {
        self.datasets
            .lock()
            .unwrap()
            .get(&locale.code)
            .cloned()
            .ok_or_else(|| DatasetError::NotFound(locale.code.clone()))
    }

    fn save(&self, dataset: &Dataset) -> Result<(), DatasetError> {
        if self.fail_saves {
            return Err(DatasetError::Io {
                path: PathBuf::from("memory"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            });
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.datasets
            .lock()
            .unwrap()
            .insert(dataset.locale.code.clone(), dataset.clone());
        Ok(())
    }
}

pub fn locale(code: &str) -> Locale {
    Locale::new(code, SITE)
}

/// Builds a dataset from a header and rows of cells.
pub fn dataset(code: &str, header: &[&str], rows: &[&[&str]]) -> Dataset {
    let columns: Vec<String> = header.iter().map(|h| h.to_string()).collect();
    let rows = rows
        .iter()
        .map(|cells| Row::from_pairs(columns.iter().cloned().zip(cells.iter().map(|c| c.to_string()))))
        .collect();
    Dataset::new(locale(code), columns, rows)
}

/// Creates `<root>/<item_key>/<file_name>` holding `bytes`.
pub fn asset(root: &Path, item_key: &str, file_name: &str, bytes: &[u8]) -> PathBuf {
    let dir = root.join(item_key);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(file_name);
    fs::write(&path, bytes).unwrap();
    path
}
