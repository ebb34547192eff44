// src/lib.rs

//! probepal: pallet identification and ingestion
//!
//! Fingerprints cluster installation media (native roll descriptors, RHEL and
//! CentOS trees, SLES ISOs) and ingests identified pallets into the managed
//! pallet directory and the installed-pallet database.
//!
//! # Architecture
//!
//! - Probes: weight-ordered fingerprinting strategies; first match wins
//! - Pipeline: fetch -> identify -> copy -> register, with a LIFO
//!   compensation stack unwound on any failure
//! - Store: SQLite table of installed pallets with an idempotent insert
//! - External tools (`mount`, `umount`, `rsync`) go through a `ProcessRunner`
//!   seam so they can be scripted in tests

mod error;
pub mod exec;
pub mod ingest;
pub mod media;
pub mod pallet;
pub mod probe;
pub mod store;

pub use error::{Error, Result};
pub use exec::{CommandOutput, ProcessRunner, SystemRunner};
pub use ingest::{
    IngestOptions, IngestReport, IngestedPallet, PalletIngestionPipeline, DEFAULT_PALLET_DIR,
};
pub use media::{MediaFetcher, MediaFormat, MediaSource, MountedIso, CDROM_MOUNTPOINT};
pub use pallet::PalletInfo;
pub use probe::{Probe, ProbeOutcome, ProberRegistry};
pub use store::{PalletRecord, PalletStore};
