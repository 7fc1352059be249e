//! Top-level upload loop.
//!
//! [`UploadScheduler::run`] walks the selected locales in order and, for each,
//! drives this state machine:
//!
//! ```text
//! Idle -> SelectingLocale -> SelectingCandidate -> ResolvingMetadata
//!      -> Transferring -> Recording -> SelectingCandidate ... -> Done
//!                          SelectingCandidate -> QuotaExhausted
//! ```
//!
//! Exactly one transfer is in flight at a time. After every successful
//! transfer the record is appended to the ledger and the ledger is flushed
//! before anything else happens; only then is the remote reference written
//! back to the locale dataset. A crash therefore loses at most the transfer
//! in flight.
//!
//! # Error Handling
//! Per-item problems (missing title, failed transfer, failed write-back) are
//! counted in the [`RunReport`] and the run continues. Authentication
//! failures and ledger failures abort the run with a [`SchedulerError`].

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::candidates::{Candidate, CandidateCursor};
use crate::contract::{Clock, DatasetStore, PublishMetadata, RemoteRef, Transport};
use crate::dataset::Dataset;
use crate::error::{SchedulerError, TransferError};
use crate::ledger::TrackingLedger;
use crate::locale::Locale;
use crate::metadata::{MetadataResolver, Resolution};

/// Run parameters injected at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Shared directory holding one sub-directory of assets per item key.
    pub asset_root: PathBuf,
    /// Maximum completed transfers per calendar day; `None` is unlimited.
    pub daily_quota: Option<u32>,
}

/// Observable scheduler states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    SelectingLocale,
    SelectingCandidate,
    ResolvingMetadata,
    Transferring,
    Recording,
    QuotaExhausted,
    Done,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a run ended. Both are successful terminations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every selected locale was walked to the end.
    Done,
    /// The daily quota was reached; re-invoke on a later day.
    QuotaExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedItem {
    pub item_key: String,
    pub remote_ref: RemoteRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocaleReport {
    pub locale: String,
    pub uploaded: Vec<UploadedItem>,
    /// Candidates dropped because metadata did not resolve.
    pub skipped: u32,
    /// Candidates whose transfer failed.
    pub errors: u32,
    /// Rows whose missing remote reference was restored from the ledger.
    pub reconciled: u32,
    pub writeback_failures: u32,
    /// Set when the dataset could not be used at all.
    pub dataset_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
    pub locales: Vec<LocaleReport>,
    pub daily_quota: Option<u32>,
    /// Ledger count for the day the run ended on.
    pub quota_used_today: u32,
}

impl RunReport {
    pub fn uploaded(&self) -> usize {
        self.locales.iter().map(|l| l.uploaded.len()).sum()
    }

    pub fn skipped(&self) -> u32 {
        self.locales.iter().map(|l| l.skipped).sum()
    }

    pub fn errors(&self) -> u32 {
        self.locales.iter().map(|l| l.errors).sum()
    }

    pub fn writeback_failures(&self) -> u32 {
        self.locales.iter().map(|l| l.writeback_failures).sum()
    }
}

enum Step {
    Idle,
    SelectingLocale,
    SelectingCandidate,
    ResolvingMetadata(Candidate),
    Transferring(Candidate, PublishMetadata),
    Recording(Candidate, RemoteRef),
    QuotaExhausted,
    Done,
}

impl Step {
    fn state(&self) -> SchedulerState {
        match self {
            Step::Idle => SchedulerState::Idle,
            Step::SelectingLocale => SchedulerState::SelectingLocale,
            Step::SelectingCandidate => SchedulerState::SelectingCandidate,
            Step::ResolvingMetadata(_) => SchedulerState::ResolvingMetadata,
            Step::Transferring(..) => SchedulerState::Transferring,
            Step::Recording(..) => SchedulerState::Recording,
            Step::QuotaExhausted => SchedulerState::QuotaExhausted,
            Step::Done => SchedulerState::Done,
        }
    }
}

/// The locale currently being walked.
struct LocaleRun {
    dataset: Dataset,
    cursor: CandidateCursor,
    report: LocaleReport,
}

pub struct UploadScheduler<T, D, C> {
    transport: T,
    store: D,
    clock: C,
    resolver: MetadataResolver,
    config: SchedulerConfig,
}

impl<T, D, C> UploadScheduler<T, D, C>
where
    T: Transport,
    D: DatasetStore,
    C: Clock,
{
    pub fn new(transport: T, store: D, clock: C, resolver: MetadataResolver, config: SchedulerConfig) -> Self {
        Self {
            transport,
            store,
            clock,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Processes `locales` in the given order against `ledger`.
    pub async fn run(
        &self,
        ledger: &mut TrackingLedger,
        locales: &[Locale],
    ) -> Result<RunReport, SchedulerError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("upload_run", run_id = %run_id);
        self.drive(run_id, ledger, locales).instrument(span).await
    }

    async fn drive(
        &self,
        run_id: Uuid,
        ledger: &mut TrackingLedger,
        locales: &[Locale],
    ) -> Result<RunReport, SchedulerError> {
        let mut pending = locales.iter();
        let mut current: Option<LocaleRun> = None;
        let mut reports: Vec<LocaleReport> = Vec::new();
        let mut step = Step::Idle;

        let outcome = loop {
            debug!(state = %step.state(), "Scheduler step");
            step = match step {
                Step::Idle => {
                    info!(
                        locales = locales.len(),
                        daily_quota = ?self.config.daily_quota,
                        used_today = ledger.quota_used(self.clock.now().date()),
                        "Upload run starting"
                    );
                    Step::SelectingLocale
                }

                Step::SelectingLocale => match pending.next() {
                    None => Step::Done,
                    Some(locale) => match self.open_locale(locale, ledger) {
                        Ok(run) => {
                            current = Some(run);
                            Step::SelectingCandidate
                        }
                        Err(report) => {
                            reports.push(report);
                            Step::SelectingLocale
                        }
                    },
                },

                Step::SelectingCandidate => {
                    let Some(run) = current.as_mut() else {
                        break RunOutcome::Done;
                    };
                    if self.quota_reached(ledger) {
                        Step::QuotaExhausted
                    } else {
                        match run
                            .cursor
                            .next_candidate(&run.dataset, &self.config.asset_root, ledger)
                        {
                            Some(candidate) => Step::ResolvingMetadata(candidate),
                            None => {
                                if let Some(done) = current.take() {
                                    info!(
                                        locale = %done.report.locale,
                                        uploaded = done.report.uploaded.len(),
                                        skipped = done.report.skipped,
                                        errors = done.report.errors,
                                        "Locale finished"
                                    );
                                    reports.push(done.report);
                                }
                                Step::SelectingLocale
                            }
                        }
                    }
                }

                Step::ResolvingMetadata(candidate) => {
                    let Some(run) = current.as_mut() else {
                        break RunOutcome::Done;
                    };
                    let row = &run.dataset.rows[candidate.row];
                    match self.resolver.resolve(row, &run.dataset.locale, &candidate.item_key) {
                        Resolution::Publish(metadata) => Step::Transferring(candidate, metadata),
                        Resolution::Skip(reason) => {
                            info!(
                                locale = %run.dataset.locale.code,
                                item_key = %candidate.item_key,
                                ?reason,
                                "Metadata did not resolve, skipping"
                            );
                            run.report.skipped += 1;
                            Step::SelectingCandidate
                        }
                    }
                }

                Step::Transferring(candidate, metadata) => {
                    let Some(run) = current.as_mut() else {
                        break RunOutcome::Done;
                    };
                    info!(
                        locale = %run.dataset.locale.code,
                        item_key = %candidate.item_key,
                        asset = %candidate.asset_path.display(),
                        "Transferring"
                    );
                    match self.transport.transfer(&candidate.asset_path, &metadata).await {
                        Ok(remote) => Step::Recording(candidate, remote),
                        Err(TransferError::Auth(e)) => {
                            error!(error = %e, "Authentication failed, aborting run");
                            return Err(SchedulerError::Auth(e));
                        }
                        Err(e) => {
                            error!(
                                locale = %run.dataset.locale.code,
                                item_key = %candidate.item_key,
                                error = %e,
                                "Transfer failed"
                            );
                            run.report.errors += 1;
                            Step::SelectingCandidate
                        }
                    }
                }

                Step::Recording(candidate, remote) => {
                    let Some(run) = current.as_mut() else {
                        break RunOutcome::Done;
                    };
                    let locale = run.dataset.locale.code.clone();
                    let record = ledger.record(&locale, &candidate.item_key, remote.clone(), self.clock.now())?;
                    let day = record.date;
                    ledger.flush()?;

                    run.dataset.set_remote_ref(&candidate.item_key, remote.as_str());
                    if let Err(e) = self.store.save(&run.dataset) {
                        warn!(locale = %locale, item_key = %candidate.item_key, error = %e, "Dataset write-back failed");
                        run.report.writeback_failures += 1;
                    }

                    info!(
                        locale = %locale,
                        item_key = %candidate.item_key,
                        remote_ref = %remote,
                        used_today = ledger.quota_used(day),
                        daily_quota = ?self.config.daily_quota,
                        "Upload recorded"
                    );
                    run.report.uploaded.push(UploadedItem {
                        item_key: candidate.item_key,
                        remote_ref: remote,
                    });
                    Step::SelectingCandidate
                }

                Step::QuotaExhausted => {
                    info!(daily_quota = ?self.config.daily_quota, "Daily quota reached, stopping");
                    break RunOutcome::QuotaExhausted;
                }

                Step::Done => break RunOutcome::Done,
            };
        };

        if let Some(run) = current.take() {
            reports.push(run.report);
        }

        let report = RunReport {
            run_id,
            outcome,
            locales: reports,
            daily_quota: self.config.daily_quota,
            quota_used_today: ledger.quota_used(self.clock.now().date()),
        };
        info!(
            outcome = ?report.outcome,
            uploaded = report.uploaded(),
            skipped = report.skipped(),
            errors = report.errors(),
            "Upload run finished"
        );
        Ok(report)
    }

    fn quota_reached(&self, ledger: &TrackingLedger) -> bool {
        match self.config.daily_quota {
            Some(quota) => ledger.quota_used(self.clock.now().date()) >= quota,
            None => false,
        }
    }

    /// Loads a locale's dataset and restores write-backs the ledger knows
    /// about but the dataset lost. Unusable datasets yield a report instead.
    fn open_locale(&self, locale: &Locale, ledger: &TrackingLedger) -> Result<LocaleRun, LocaleReport> {
        let mut report = LocaleReport {
            locale: locale.code.clone(),
            ..LocaleReport::default()
        };
        info!(locale = %locale.code, site = %locale.site_url, "Opening locale");

        let mut dataset = match self.store.load(locale) {
            Ok(dataset) => dataset,
            Err(e) => {
                warn!(locale = %locale.code, error = %e, "Cannot load dataset, skipping locale");
                report.dataset_error = Some(e.to_string());
                return Err(report);
            }
        };
        if dataset.key_column().is_none() {
            warn!(locale = %locale.code, "Dataset has no id or product_id column, skipping locale");
            report.dataset_error = Some("no id or product_id column".to_string());
            return Err(report);
        }

        for record in ledger.records_for(&locale.code) {
            if dataset.row_for(&record.item_key).is_some() && dataset.remote_ref(&record.item_key).is_none() {
                report.reconciled += dataset.set_remote_ref(&record.item_key, record.remote_ref.as_str()) as u32;
            }
        }
        if report.reconciled > 0 {
            info!(locale = %locale.code, rows = report.reconciled, "Restoring remote references from ledger");
            if let Err(e) = self.store.save(&dataset) {
                warn!(locale = %locale.code, error = %e, "Dataset write-back failed");
                report.writeback_failures += 1;
            }
        }

        Ok(LocaleRun {
            dataset,
            cursor: CandidateCursor::new(),
            report,
        })
    }
}

/// Candidates still waiting across `locales`; unreadable datasets count as zero.
pub fn pending_candidates<D: DatasetStore>(
    store: &D,
    locales: &[Locale],
    asset_root: &Path,
    ledger: &TrackingLedger,
) -> usize {
    locales
        .iter()
        .filter_map(|locale| store.load(locale).ok())
        .map(|dataset| crate::candidates::candidates(&dataset, asset_root, ledger).len())
        .sum()
}
