//! Logical view of a locale dataset: ordered rows of named string columns.

use std::collections::HashMap;

use crate::locale::Locale;

/// Columns that may hold the item key, in priority order.
pub const KEY_COLUMNS: [&str; 2] = ["id", "product_id"];

/// Column receiving the remote reference after a successful upload.
pub const REMOTE_REF_COLUMN: &str = "youtube_url";

/// One dataset row. Missing columns read as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: HashMap<String, String>,
}

impl Row {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.values.insert(column.into(), value.into());
    }
}

/// A locale's rows, in their stored order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub locale: Locale,
    /// Column order as stored; new columns are appended.
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(locale: Locale, columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            locale,
            columns,
            rows,
        }
    }

    /// The column holding item keys, if the dataset has one.
    pub fn key_column(&self) -> Option<&str> {
        KEY_COLUMNS
            .iter()
            .copied()
            .find(|k| self.columns.iter().any(|c| c == k))
    }

    /// The trimmed, non-empty item key of `row`.
    pub fn item_key<'a>(&self, row: &'a Row) -> Option<&'a str> {
        let column = self.key_column()?;
        row.get(column).map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn row_for(&self, item_key: &str) -> Option<&Row> {
        self.rows
            .iter()
            .find(|row| self.item_key(row) == Some(item_key))
    }

    /// Current non-empty remote reference stored for `item_key`.
    pub fn remote_ref(&self, item_key: &str) -> Option<&str> {
        self.row_for(item_key)
            .and_then(|row| row.get(REMOTE_REF_COLUMN))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Writes `remote_ref` into every row keyed by `item_key`, adding the
    /// column when missing. Returns how many rows changed.
    pub fn set_remote_ref(&mut self, item_key: &str, remote_ref: &str) -> usize {
        if !self.columns.iter().any(|c| c == REMOTE_REF_COLUMN) {
            self.columns.push(REMOTE_REF_COLUMN.to_string());
        }
        let Some(column) = self.key_column().map(str::to_owned) else {
            return 0;
        };

        let mut changed = 0;
        for row in &mut self.rows {
            let matches = row.get(&column).map(str::trim) == Some(item_key);
            if matches && row.get(REMOTE_REF_COLUMN) != Some(remote_ref) {
                row.set(REMOTE_REF_COLUMN, remote_ref);
                changed += 1;
            }
        }
        changed
    }
}
