#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

/// Writes `<dir>/CSV/all_products.csv`.
pub fn write_dataset(dir: &Path, body: &str) -> PathBuf {
    let csv_dir = dir.join("CSV");
    fs::create_dir_all(&csv_dir).unwrap();
    let path = csv_dir.join("all_products.csv");
    fs::write(&path, body).unwrap();
    path
}

pub fn write_translations(dir: &Path, body: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("translations.csv"), body).unwrap();
}

/// Writes a config file pointing every path inside `root`.
pub fn write_config(root: &Path, extra: &str) -> PathBuf {
    let path = root.join("tube-sync.yaml");
    let yaml = format!(
        "catalog_root: {catalog}\nledger_path: {ledger}\nselection_path: {selection}\ncredentials_path: {creds}\ndefault_site_url: https://shop.example/\n{extra}",
        catalog = root.join("catalog").display(),
        ledger = root.join("state/upload_tracking.json").display(),
        selection = root.join("state/upload_config.json").display(),
        creds = root.join("state/credentials.json").display(),
    );
    fs::write(&path, yaml).unwrap();
    path
}

/// Client for talking to a local `MockServer`, whatever proxy the
/// environment configures.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
