//! # tube-sync CLI interface
//!
//! Command parsing and wiring only: every scheduling decision lives in
//! `tube-sync-core`. This module builds the concrete collaborators (CSV
//! dataset store, stored-credential authenticator, YouTube endpoint), hands
//! them to the core scheduler and prints the run summary.
//!
//! For programmatic and integration use call [`run`] with a constructed [`Cli`].

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tube_sync_core::contract::{DatasetStore, SystemClock};
use tube_sync_core::ledger::TrackingLedger;
use tube_sync_core::locale::{natural_cmp, select_locales, LocaleSelection};
use tube_sync_core::scheduler::{
    pending_candidates, RunOutcome, RunReport, SchedulerConfig, UploadScheduler,
};
use tube_sync_core::selection::{load_selection, save_selection};
use tube_sync_core::transport::ChunkedTransport;

use crate::auth::StoredCredentialAuth;
use crate::csv_store::CsvDatasetStore;
use crate::load_config::{load_config, CliConfig};
use crate::youtube::{VideoSettings, YouTubeEndpoint};

/// CLI for tube-sync: publish per-locale product videos under a daily quota.
#[derive(Parser)]
#[clap(
    name = "tube-sync",
    version,
    about = "Upload per-locale product videos to YouTube, at most a daily quota per day"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload pending videos for the selected locales
    Upload {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Locale codes to process, in this order
        #[clap(long, num_args = 1.., value_delimiter = ',')]
        langs: Vec<String>,
        /// Process every discovered locale, ignoring the saved selection
        #[clap(long)]
        all: bool,
        /// Remember this selection (`--langs`, or all with `--all`) for later runs
        #[clap(long)]
        save_selection: bool,
    },
    /// List discovered locales and the saved selection
    Locales {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Explicit codes win over `--all`, which wins over the saved selection.
pub fn resolve_selection(langs: &[String], all: bool, saved: Option<LocaleSelection>) -> LocaleSelection {
    if !langs.is_empty() {
        LocaleSelection::Only(langs.to_vec())
    } else if all {
        LocaleSelection::All
    } else {
        saved.unwrap_or(LocaleSelection::All)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Upload {
            config,
            langs,
            all,
            save_selection: save,
        } => {
            let config = load_config(config)?;
            upload(&config, &langs, all, save).await
        }
        Commands::Locales { config } => {
            let config = load_config(config)?;
            list_locales(&config)
        }
    }
}

/// Redirects stay visible to the endpoint (a `308` is upload progress, not
/// a redirect). Every request is bounded by the configured timeouts.
pub fn http_client_builder(config: &CliConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(config.connect_timeout())
        .timeout(config.request_timeout())
}

async fn upload(config: &CliConfig, langs: &[String], all: bool, save: bool) -> Result<()> {
    let store = CsvDatasetStore::from_config(config);
    let discovered = store
        .discover_locales()
        .context("Failed to discover locales")?;
    if discovered.is_empty() {
        anyhow::bail!(
            "no locale datasets found under {}",
            config.catalog_root.display()
        );
    }

    let saved = load_selection(&config.selection_path).context("Failed to read saved locale selection")?;
    let selection = resolve_selection(langs, all, saved);
    let locales = select_locales(&discovered, &selection);
    if locales.is_empty() {
        anyhow::bail!("none of the selected locales were found: {selection:?}");
    }

    // Persisted only once it matched a discovered locale.
    if save {
        if langs.is_empty() && !all {
            tracing::warn!("--save-selection needs --langs or --all; nothing saved");
        } else {
            save_selection(&config.selection_path, langs).context("Failed to save locale selection")?;
        }
    }
    tracing::info!(
        command = "upload",
        locales = ?locales.iter().map(|l| l.code.as_str()).collect::<Vec<_>>(),
        "Locales selected"
    );

    let mut ledger = TrackingLedger::open(&config.ledger_path)
        .with_context(|| format!("Failed to open ledger {}", config.ledger_path.display()))?;

    let client = http_client_builder(config)
        .build()
        .context("Failed to build HTTP client")?;
    let endpoint = YouTubeEndpoint::new(
        client.clone(),
        VideoSettings {
            category_id: config.upload.category_id.clone(),
            privacy_status: config.upload.privacy_status.clone(),
        },
    );
    let auth = StoredCredentialAuth::new(&config.credentials_path, client);
    let transport = ChunkedTransport::new(endpoint, auth, config.retry_policy(), config.upload.chunk_size);

    let resolver = config.metadata_resolver();
    let asset_root = config.asset_dir();
    let scheduler = UploadScheduler::new(
        transport,
        store.clone(),
        SystemClock,
        resolver,
        SchedulerConfig {
            asset_root: asset_root.clone(),
            daily_quota: config.daily_quota,
        },
    );

    let report = match scheduler.run(&mut ledger, &locales).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(command = "upload", error = %e, "Upload run aborted");
            return Err(anyhow::Error::new(e).context("Upload run aborted"));
        }
    };

    let pending = pending_candidates(&store, &locales, &asset_root, &ledger);
    print!("{}", render_summary(&report, pending));
    Ok(())
}

fn list_locales(config: &CliConfig) -> Result<()> {
    let store = CsvDatasetStore::from_config(config);
    let mut discovered = store
        .discover_locales()
        .context("Failed to discover locales")?;
    if discovered.is_empty() {
        anyhow::bail!(
            "no locale datasets found under {}",
            config.catalog_root.display()
        );
    }
    discovered.sort_by(|a, b| natural_cmp(&a.code, &b.code));

    for locale in &discovered {
        println!("{}\t{}", locale.code, locale.site_url);
    }
    match load_selection(&config.selection_path).context("Failed to read saved locale selection")? {
        Some(LocaleSelection::Only(codes)) => println!("saved selection: {}", codes.join(", ")),
        _ => println!("saved selection: all"),
    }
    Ok(())
}

/// Human-readable end-of-run report.
pub fn render_summary(report: &RunReport, pending: usize) -> String {
    let mut out = String::new();
    let outcome = match report.outcome {
        RunOutcome::Done => "done",
        RunOutcome::QuotaExhausted => "daily quota reached",
    };
    let _ = writeln!(out, "Run {} finished: {outcome}", report.run_id);
    for locale in &report.locales {
        match &locale.dataset_error {
            Some(e) => {
                let _ = writeln!(out, "  {}: skipped ({e})", locale.locale);
            }
            None => {
                let _ = writeln!(
                    out,
                    "  {}: {} uploaded, {} skipped, {} failed",
                    locale.locale,
                    locale.uploaded.len(),
                    locale.skipped,
                    locale.errors
                );
            }
        }
        for item in &locale.uploaded {
            let _ = writeln!(out, "    {} -> {}", item.item_key, item.remote_ref);
        }
    }
    let _ = writeln!(
        out,
        "Uploaded: {}  Skipped: {}  Failed: {}  Write-back failures: {}",
        report.uploaded(),
        report.skipped(),
        report.errors(),
        report.writeback_failures()
    );
    match report.daily_quota {
        Some(quota) => {
            let _ = writeln!(out, "Quota used today: {}/{quota}", report.quota_used_today);
        }
        None => {
            let _ = writeln!(out, "Quota used today: {} (unlimited)", report.quota_used_today);
        }
    }
    let _ = writeln!(out, "Remaining candidates: {pending}");
    out
}
