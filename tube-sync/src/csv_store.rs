//! [`DatasetStore`] over a catalog tree of CSV files.
//!
//! ```text
//! <root>/CSV/all_products.csv          default locale
//! <root>/translations.csv
//! <root>/<code>/CSV/all_products.csv   one directory per other locale
//! <root>/<code>/translations.csv
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use tube_sync_core::contract::DatasetStore;
use tube_sync_core::dataset::{Dataset, Row};
use tube_sync_core::error::DatasetError;
use tube_sync_core::locale::Locale;

use crate::load_config::CliConfig;

pub const DATASET_FILE: [&str; 2] = ["CSV", "all_products.csv"];
pub const BACKUP_EXTENSION: &str = "csv.backup_youtube";
pub const TRANSLATIONS_FILE: &str = "translations.csv";
pub const SITE_DOMAIN_KEY: &str = "site.domain";

#[derive(Debug, Clone)]
pub struct CsvDatasetStore {
    root: PathBuf,
    default_locale: String,
    default_site_url: String,
    excluded_dirs: Vec<String>,
}

impl CsvDatasetStore {
    pub fn new(
        root: impl Into<PathBuf>,
        default_locale: impl Into<String>,
        default_site_url: impl Into<String>,
        excluded_dirs: Vec<String>,
    ) -> Self {
        Self {
            root: root.into(),
            default_locale: default_locale.into(),
            default_site_url: default_site_url.into(),
            excluded_dirs,
        }
    }

    pub fn from_config(config: &CliConfig) -> Self {
        Self::new(
            &config.catalog_root,
            &config.default_locale,
            &config.default_site_url,
            config.excluded_dirs.clone(),
        )
    }

    fn root_is_default_locale(&self) -> bool {
        dataset_file(&self.root).is_file()
    }

    fn locale_dir(&self, code: &str) -> PathBuf {
        if code.eq_ignore_ascii_case(&self.default_locale) && self.root_is_default_locale() {
            self.root.clone()
        } else {
            self.root.join(code)
        }
    }

    pub fn dataset_path(&self, code: &str) -> PathBuf {
        dataset_file(&self.locale_dir(code))
    }

    fn is_excluded(&self, name: &str) -> bool {
        name.starts_with('.') || self.excluded_dirs.iter().any(|e| e.eq_ignore_ascii_case(name))
    }

    /// Site URL from `translations.csv`, else the configured default.
    pub fn site_url(&self, locale_dir: &Path) -> String {
        let path = locale_dir.join(TRANSLATIONS_FILE);
        if path.is_file() {
            match read_site_domain(&path) {
                Ok(Some(url)) => return url,
                Ok(None) => debug!(path = %path.display(), "No site.domain entry"),
                Err(e) => warn!(path = %path.display(), error = %e, "Cannot read translations"),
            }
        }
        self.default_site_url.trim_end_matches('/').to_string()
    }
}

fn dataset_file(dir: &Path) -> PathBuf {
    DATASET_FILE.iter().fold(dir.to_path_buf(), |p, part| p.join(part))
}

fn read_site_domain(path: &Path) -> Result<Option<String>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let key_idx = headers.iter().position(|h| h.trim() == "key");
    let en_idx = headers.iter().position(|h| h.trim() == "en");
    let Some(key_idx) = key_idx else {
        return Ok(None);
    };

    for record in reader.records() {
        let record = record?;
        if record.get(key_idx).map(str::trim) != Some(SITE_DOMAIN_KEY) {
            continue;
        }
        let from_en = en_idx.and_then(|i| record.get(i)).map(str::trim).filter(|v| !v.is_empty());
        let first_value = headers
            .iter()
            .enumerate()
            .find(|(i, _)| *i != key_idx)
            .and_then(|(i, _)| record.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(url) = from_en.or(first_value) {
            return Ok(Some(url.trim_end_matches('/').to_string()));
        }
    }
    Ok(None)
}

fn malformed(path: &Path, e: impl std::fmt::Display) -> DatasetError {
    DatasetError::Malformed {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

impl DatasetStore for CsvDatasetStore {
    fn discover_locales(&self) -> Result<Vec<Locale>, DatasetError> {
        let mut found = Vec::new();
        if self.root_is_default_locale() {
            found.push(Locale::new(&self.default_locale, self.site_url(&self.root)));
        }

        let entries = fs::read_dir(&self.root).map_err(|source| DatasetError::Io {
            path: self.root.clone(),
            source,
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
                continue;
            };
            if !path.is_dir() || self.is_excluded(&name) || !dataset_file(&path).is_file() {
                continue;
            }
            if found.iter().any(|l: &Locale| l.code.eq_ignore_ascii_case(&name)) {
                warn!(dir = %path.display(), "Locale directory shadowed by the catalog root, ignoring");
                continue;
            }
            found.push(Locale::new(name, self.site_url(&path)));
        }

        info!(root = %self.root.display(), locales = found.len(), "Discovered locales");
        Ok(found)
    }

    fn load(&self, locale: &Locale) -> Result<Dataset, DatasetError> {
        let path = self.dataset_path(&locale.code);
        if !path.is_file() {
            return Err(DatasetError::NotFound(locale.code.clone()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&path)
            .map_err(|e| malformed(&path, e))?;
        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| malformed(&path, e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| malformed(&path, e))?;
            rows.push(Row::from_pairs(
                columns.iter().cloned().zip(record.iter().map(str::to_string)),
            ));
        }
        debug!(locale = %locale.code, path = %path.display(), rows = rows.len(), "Loaded dataset");
        Ok(Dataset::new(locale.clone(), columns, rows))
    }

    /// Keeps the previous file as `all_products.csv.backup_youtube`, then
    /// replaces it atomically.
    fn save(&self, dataset: &Dataset) -> Result<(), DatasetError> {
        let path = self.dataset_path(&dataset.locale.code);
        let io = |source: std::io::Error| DatasetError::Io {
            path: path.clone(),
            source,
        };
        let dir = path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir).map_err(io)?;

        if path.is_file() {
            fs::copy(&path, path.with_extension(BACKUP_EXTENSION)).map_err(io)?;
        }

        let mut tmp = NamedTempFile::new_in(dir).map_err(io)?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
            writer.write_record(&dataset.columns).map_err(|e| malformed(&path, e))?;
            for row in &dataset.rows {
                writer
                    .write_record(dataset.columns.iter().map(|c| row.get(c).unwrap_or("")))
                    .map_err(|e| malformed(&path, e))?;
            }
            writer.flush().map_err(io)?;
        }
        tmp.as_file_mut().flush().map_err(io)?;
        tmp.as_file().sync_all().map_err(io)?;
        tmp.persist(&path).map_err(|e| io(e.error))?;

        debug!(locale = %dataset.locale.code, path = %path.display(), "Saved dataset");
        Ok(())
    }
}
