// src/probe/mod.rs

//! Pallet fingerprinting probes
//!
//! This module fingerprints a directory to determine whether it contains a
//! pallet, and if so which kind. Probes are registered with a weight; lower
//! weights are attempted first, so specific formats (native roll descriptors)
//! win over generic ones. A probe distinguishes a hard non-match ("my marker
//! file is absent") from a partial match ("this looks like my format but the
//! metadata is incomplete"); the registry keeps going in both cases, but
//! partial-match reports are retained and attached to the terminal error when
//! nothing identifies the media.

pub mod native;
pub mod sles;
pub mod treeinfo;

pub use native::NativeRollProber;
pub use sles::Sles11_12Prober;
pub use treeinfo::TreeinfoProber;

use crate::error::{Error, Result};
use crate::pallet::PalletInfo;
use std::path::Path;
use tracing::debug;

/// Result of running one probe against a media root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The media is this probe's format and fully identified
    Match(PalletInfo),
    /// The media is clearly not this probe's format
    NoMatch,
    /// The media resembles this probe's format but metadata is incomplete
    /// or malformed; the reason is kept for diagnostics
    Ambiguous(String),
}

/// A media-fingerprinting strategy.
///
/// Implementations are stateless and reusable across probe calls; they only
/// inspect the filesystem read-only.
pub trait Probe {
    /// Lower weights are attempted first
    fn weight(&self) -> u32;

    /// Human-readable description of what this probe recognizes
    fn description(&self) -> &str;

    /// Inspect `media_root` and report whether it is this probe's format
    fn probe(&self, media_root: &Path) -> ProbeOutcome;
}

/// Ordered collection of probes.
///
/// Probes are kept sorted ascending by weight; ties preserve registration
/// order, so the order within one run is stable.
#[derive(Default)]
pub struct ProberRegistry {
    probes: Vec<Box<dyn Probe>>,
}

impl ProberRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self { probes: Vec::new() }
    }

    /// A registry with all built-in probes registered
    pub fn with_default_probes() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(NativeRollProber::new()));
        registry.register(Box::new(TreeinfoProber::new()));
        registry.register(Box::new(Sles11_12Prober::new()));
        registry
    }

    /// Add a probe, keeping the list sorted by weight (stable on ties)
    pub fn register(&mut self, probe: Box<dyn Probe>) {
        let at = self.probes.partition_point(|p| p.weight() <= probe.weight());
        self.probes.insert(at, probe);
    }

    /// Number of registered probes
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Run probes in weight order and return the first match.
    ///
    /// Fails with `UnidentifiedMedia` when every probe reports `NoMatch` or
    /// `Ambiguous`; the ambiguous reports are folded into the error.
    pub fn identify(&self, media_root: &Path) -> Result<PalletInfo> {
        let mut reports = Vec::new();

        for probe in &self.probes {
            debug!(
                "probing {} with {} (weight {})",
                media_root.display(),
                probe.description(),
                probe.weight()
            );
            match probe.probe(media_root) {
                ProbeOutcome::Match(info) => {
                    debug!("identified {} as {}", media_root.display(), info);
                    return Ok(info);
                }
                ProbeOutcome::NoMatch => continue,
                ProbeOutcome::Ambiguous(reason) => {
                    debug!("partial match from {}: {}", probe.description(), reason);
                    reports.push(format!("{}: {}", probe.description(), reason));
                }
            }
        }

        Err(Error::unidentified(media_root, &reports))
    }
}
