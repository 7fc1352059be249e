//! Persisted default locale selection.
//!
//! Stored as `{"languages": ["fr", "de"]}`. An empty list means "all".

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SelectionError;
use crate::locale::LocaleSelection;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionFile {
    #[serde(default)]
    pub languages: Vec<String>,
}

/// Reads the saved selection. `Ok(None)` when nothing has been saved yet.
pub fn load_selection(path: &Path) -> Result<Option<LocaleSelection>, SelectionError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(SelectionError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    let file: SelectionFile = serde_json::from_str(&content).map_err(|e| SelectionError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    if file.languages.is_empty() {
        return Ok(None);
    }
    Ok(Some(LocaleSelection::from_codes(file.languages)))
}

/// Saves `codes` as the new default selection.
pub fn save_selection(path: &Path, codes: &[String]) -> Result<(), SelectionError> {
    let io = |source: std::io::Error| SelectionError::Io {
        path: PathBuf::from(path),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io)?;
    }
    let file = SelectionFile {
        languages: codes.to_vec(),
    };
    let body = serde_json::to_string_pretty(&file).map_err(|e| SelectionError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    fs::write(path, body).map_err(io)?;
    info!(path = %path.display(), languages = ?codes, "Saved locale selection");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_no_saved_selection() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_selection(&dir.path().join("none.json")).unwrap(), None);
    }

    #[test]
    fn saved_codes_round_trip_as_selection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/upload_config.json");
        save_selection(&path, &["fr".to_string(), "de".to_string()]).unwrap();
        assert_eq!(
            load_selection(&path).unwrap(),
            Some(LocaleSelection::Only(vec!["fr".into(), "de".into()]))
        );
    }

    #[test]
    fn empty_saved_list_means_no_restriction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload_config.json");
        save_selection(&path, &[]).unwrap();
        assert_eq!(load_selection(&path).unwrap(), None);
    }

    #[test]
    fn invalid_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload_config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_selection(&path), Err(SelectionError::Parse { .. })));
    }
}
