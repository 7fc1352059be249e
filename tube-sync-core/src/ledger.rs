//! # ledger: durable idempotency and quota state
//!
//! The [`TrackingLedger`] holds one [`UploadRecord`] per `(locale, item key)`
//! pair, ever. Records are appended, never edited or removed. The per-day
//! counter used for quota enforcement is derived from the records and kept
//! in step with them on every append, so it cannot drift.
//!
//! ## Persisted shape
//! ```json
//! {
//!   "uploads": [
//!     {"locale": "fr", "item_key": "42", "remote_ref": "https://...",
//!      "date": "2026-10-16", "timestamp": "2026-10-16T09:12:01.5"}
//!   ],
//!   "daily_uploads": {"2026-10-16": 1}
//! }
//! ```
//! `daily_uploads` is written for operators only and recomputed on load.
//! Files in the older shape (`uploads` keyed by `"<locale>_<id>"`) are
//! accepted; their locale and item key come from the record fields.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::contract::RemoteRef;
use crate::error::LedgerError;

/// Structured ledger key. Never concatenated into a single string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub locale: String,
    pub item_key: String,
}

impl RecordKey {
    pub fn new(locale: impl Into<String>, item_key: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            item_key: item_key.into(),
        }
    }
}

/// A completed upload. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub locale: String,
    pub item_key: String,
    pub remote_ref: RemoteRef,
    /// Calendar day the upload counts against.
    pub date: NaiveDate,
    pub timestamp: NaiveDateTime,
}

impl UploadRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.locale.clone(), self.item_key.clone())
    }
}

pub struct TrackingLedger {
    path: PathBuf,
    records: Vec<UploadRecord>,
    index: HashMap<RecordKey, usize>,
    daily: BTreeMap<NaiveDate, u32>,
}

impl TrackingLedger {
    /// Loads the ledger at `path`; a missing file is an empty ledger.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let mut ledger = Self {
            path: path.clone(),
            records: Vec::new(),
            index: HashMap::new(),
            daily: BTreeMap::new(),
        };

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(ledger = %path.display(), "No ledger file yet, starting empty");
                return Ok(ledger);
            }
            Err(e) => {
                return Err(LedgerError::Persistence { path, source: e });
            }
        };
        if content.trim().is_empty() {
            return Ok(ledger);
        }

        let stored: StoredLedger =
            serde_json::from_str(&content).map_err(|e| LedgerError::Corrupt {
                path: path.clone(),
                message: e.to_string(),
            })?;

        for record in stored.uploads.into_records() {
            let key = record.key();
            if ledger.index.contains_key(&key) {
                return Err(LedgerError::Corrupt {
                    path,
                    message: format!(
                        "duplicate record for locale {:?}, item {:?}",
                        key.locale, key.item_key
                    ),
                });
            }
            ledger.push(record);
        }

        for (day, stored_count) in &stored.daily_uploads {
            let derived = NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .ok()
                .map(|d| ledger.quota_used(d));
            if derived != Some(*stored_count) {
                warn!(
                    day = %day,
                    stored = stored_count,
                    derived = ?derived,
                    "Stored daily count disagrees with records, using records"
                );
            }
        }

        info!(
            ledger = %ledger.path.display(),
            records = ledger.records.len(),
            "Ledger loaded"
        );
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_record(&self, locale: &str, item_key: &str) -> bool {
        self.get(locale, item_key).is_some()
    }

    pub fn get(&self, locale: &str, item_key: &str) -> Option<&UploadRecord> {
        self.index
            .get(&RecordKey::new(locale, item_key))
            .map(|&i| &self.records[i])
    }

    /// Records of one locale, in append order.
    pub fn records_for<'a>(&'a self, locale: &'a str) -> impl Iterator<Item = &'a UploadRecord> + 'a {
        self.records.iter().filter(move |r| r.locale == locale)
    }

    pub fn records(&self) -> &[UploadRecord] {
        &self.records
    }

    /// Completed uploads counted against `date`.
    pub fn quota_used(&self, date: NaiveDate) -> u32 {
        self.daily.get(&date).copied().unwrap_or(0)
    }

    /// Appends a record dated by `at`. Fails rather than overwrite.
    ///
    /// The new state is in memory only until [`flush`](Self::flush).
    pub fn record(
        &mut self,
        locale: &str,
        item_key: &str,
        remote_ref: RemoteRef,
        at: NaiveDateTime,
    ) -> Result<&UploadRecord, LedgerError> {
        if self.has_record(locale, item_key) {
            return Err(LedgerError::DuplicateRecord {
                locale: locale.to_string(),
                item_key: item_key.to_string(),
            });
        }
        let record = UploadRecord {
            locale: locale.to_string(),
            item_key: item_key.to_string(),
            remote_ref,
            date: at.date(),
            timestamp: at,
        };
        debug!(locale, item_key, date = %record.date, "Appending upload record");
        let i = self.push(record);
        Ok(&self.records[i])
    }

    /// Writes the whole ledger to its path via a temp file and rename.
    pub fn flush(&self) -> Result<(), LedgerError> {
        let persistence = |source: std::io::Error| LedgerError::Persistence {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(persistence)?;

        let daily: BTreeMap<String, u32> = self
            .daily
            .iter()
            .map(|(d, n)| (d.format("%Y-%m-%d").to_string(), *n))
            .collect();
        let body = serde_json::to_vec_pretty(&LedgerFile {
            uploads: &self.records,
            daily_uploads: &daily,
        })
        .map_err(|e| persistence(e.into()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(persistence)?;
        tmp.write_all(&body).map_err(persistence)?;
        tmp.as_file().sync_all().map_err(persistence)?;
        tmp.persist(&self.path).map_err(|e| persistence(e.error))?;

        debug!(ledger = %self.path.display(), records = self.records.len(), "Ledger flushed");
        Ok(())
    }

    fn push(&mut self, record: UploadRecord) -> usize {
        *self.daily.entry(record.date).or_insert(0) += 1;
        let i = self.records.len();
        self.index.insert(record.key(), i);
        self.records.push(record);
        i
    }
}

#[derive(Serialize)]
struct LedgerFile<'a> {
    uploads: &'a [UploadRecord],
    daily_uploads: &'a BTreeMap<String, u32>,
}

#[derive(Deserialize)]
struct StoredLedger {
    #[serde(default)]
    uploads: StoredUploads,
    #[serde(default)]
    daily_uploads: BTreeMap<String, u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredUploads {
    Records(Vec<UploadRecord>),
    Legacy(BTreeMap<String, LegacyRecord>),
}

impl Default for StoredUploads {
    fn default() -> Self {
        StoredUploads::Records(Vec::new())
    }
}

impl StoredUploads {
    fn into_records(self) -> Vec<UploadRecord> {
        match self {
            StoredUploads::Records(records) => records,
            StoredUploads::Legacy(map) => {
                let mut records: Vec<UploadRecord> = map
                    .into_values()
                    .map(|legacy| UploadRecord {
                        locale: legacy.lang,
                        item_key: legacy.product_id,
                        remote_ref: RemoteRef(legacy.youtube_url),
                        date: legacy.upload_date,
                        timestamp: legacy.upload_datetime,
                    })
                    .collect();
                records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
                records
            }
        }
    }
}

#[derive(Deserialize)]
struct LegacyRecord {
    lang: String,
    product_id: String,
    youtube_url: String,
    upload_date: NaiveDate,
    upload_datetime: NaiveDateTime,
}
