//! Walks a locale dataset in row order and yields upload candidates.
//!
//! A row is a candidate when the ledger has no record for it and its asset
//! directory (`<asset_root>/<item_key>/`) holds a video file. Enumeration is
//! lazy and read-only: [`CandidateCursor::next_candidate`] re-reads the ledger
//! on every call, so records appended mid-iteration are honoured, and a fresh
//! cursor restarts from the first row.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dataset::Dataset;
use crate::ledger::TrackingLedger;

/// Accepted video extensions, highest priority first. Matched case-insensitively.
pub const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "webm", "mov", "avi", "mkv"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Index into `Dataset::rows`.
    pub row: usize,
    pub item_key: String,
    pub asset_path: PathBuf,
}

/// Position within one dataset's rows.
#[derive(Debug, Clone, Default)]
pub struct CandidateCursor {
    next_row: usize,
}

impl CandidateCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances to the next eligible row, or `None` once rows are exhausted.
    pub fn next_candidate(
        &mut self,
        dataset: &Dataset,
        asset_root: &Path,
        ledger: &TrackingLedger,
    ) -> Option<Candidate> {
        while self.next_row < dataset.rows.len() {
            let row = self.next_row;
            self.next_row += 1;

            let Some(item_key) = dataset.item_key(&dataset.rows[row]) else {
                continue;
            };
            if ledger.has_record(&dataset.locale.code, item_key) {
                continue;
            }
            match find_asset(asset_root, item_key) {
                Some(asset_path) => {
                    return Some(Candidate {
                        row,
                        item_key: item_key.to_string(),
                        asset_path,
                    })
                }
                None => debug!(locale = %dataset.locale.code, item_key, "No asset, not a candidate"),
            }
        }
        None
    }
}

/// All candidates of `dataset`, collected eagerly.
pub fn candidates(dataset: &Dataset, asset_root: &Path, ledger: &TrackingLedger) -> Vec<Candidate> {
    let mut cursor = CandidateCursor::new();
    std::iter::from_fn(|| cursor.next_candidate(dataset, asset_root, ledger)).collect()
}

/// Picks the asset for `item_key`: the highest-priority extension wins,
/// ties go to the lexicographically first file name.
pub fn find_asset(asset_root: &Path, item_key: &str) -> Option<PathBuf> {
    if !is_safe_key(item_key) {
        debug!(item_key, "Item key is not a plain directory name");
        return None;
    }
    let dir = asset_root.join(item_key);
    let entries = fs::read_dir(&dir).ok()?;

    let mut best: Option<(usize, String, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(rank) = extension_rank(&path) else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        let better = match &best {
            None => true,
            Some((best_rank, best_name, _)) => (rank, &name) < (*best_rank, best_name),
        };
        if better {
            best = Some((rank, name, path));
        }
    }
    best.map(|(_, _, path)| path)
}

fn extension_rank(path: &Path) -> Option<usize> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    VIDEO_EXTENSIONS.iter().position(|e| *e == ext)
}

fn is_safe_key(item_key: &str) -> bool {
    !item_key.is_empty()
        && item_key != "."
        && item_key != ".."
        && !item_key.contains(['/', '\\'])
}
