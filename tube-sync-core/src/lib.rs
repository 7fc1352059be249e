#![doc = "tube-sync-core: scheduling, ledger and transfer logic for tube-sync."]

//! This crate holds everything that decides *what* gets uploaded and *when*:
//! candidate enumeration, metadata resolution, the idempotency ledger with its
//! daily quota view, the resumable transport and the scheduler that ties them
//! together. Network clients, credential storage and dataset file formats are
//! collaborators behind the traits in [`contract`].
//!
//! # Usage
//! Build an [`scheduler::UploadScheduler`] from a [`contract::Transport`], a
//! [`contract::DatasetStore`] and a [`contract::Clock`], open a
//! [`ledger::TrackingLedger`] and call `run`.

pub mod candidates;
pub mod contract;
pub mod dataset;
pub mod error;
pub mod ledger;
pub mod locale;
pub mod metadata;
pub mod retry;
pub mod scheduler;
pub mod selection;
pub mod transport;
