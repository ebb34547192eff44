// src/ingest.rs

//! Pallet ingestion pipeline
//!
//! For one media source: fetch -> identify -> copy -> register -> permission
//! fixup, with all-or-nothing semantics per source. Every side-effecting step
//! pushes a compensating action onto a LIFO cleanup stack; the stack is
//! unwound fully on any later failure and discarded only after the whole
//! source has committed. Scratch resources (download dirs, ISO mounts) are
//! RAII guards released on both paths.
//!
//! # Lifecycle
//!
//! ```text
//! Fetched -> Identified -> { Copied -> Registered } x N pallets -> Committed
//!                                   |
//!                                   v on any failure
//!                             RolledBack (stack unwound, caller may retry)
//! ```

use crate::error::{Error, Result};
use crate::exec::ProcessRunner;
use crate::media::{MediaFetcher, MediaFormat, MediaSource};
use crate::pallet::PalletInfo;
use crate::probe::native::{find_roll_descriptors, parse_roll_file};
use crate::probe::ProberRegistry;
use crate::store::PalletStore;
use std::fmt;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use url::Url;
use walkdir::WalkDir;

/// Default base directory for installed pallets
pub const DEFAULT_PALLET_DIR: &str = "/export/stack/pallets";

/// Transfer-table artifacts excluded from the copy
const COPY_EXCLUDE: &str = "TRANS.TBL";

/// Pipeline phase, for tracing and rollback reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    Fetched,
    Identified,
    Copied,
    Registered,
    Committed,
    RolledBack,
}

impl fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetched => "fetched",
            Self::Identified => "identified",
            Self::Copied => "copied",
            Self::Registered => "registered",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
        };
        write!(f, "{s}")
    }
}

/// Ingestion knobs, mirroring the `add pallet` command parameters
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Base directory the pallet tree is copied under
    pub pallet_dir: PathBuf,
    /// Remove an existing destination before copying
    pub clean: bool,
    /// Register ingested pallets in the store
    pub updatedb: bool,
    /// Identify and report only; no copies, no database writes
    pub dryrun: bool,
    /// Credentials for authenticated download servers
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            pallet_dir: PathBuf::from(DEFAULT_PALLET_DIR),
            clean: false,
            updatedb: true,
            dryrun: false,
            username: None,
            password: None,
        }
    }
}

/// One pallet ingested from a source
#[derive(Debug, Clone)]
pub struct IngestedPallet {
    pub info: PalletInfo,
    pub destination: PathBuf,
    /// Identified from a native roll descriptor rather than a foreign probe
    pub native: bool,
}

/// Result of ingesting one media source
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub source: String,
    pub pallets: Vec<IngestedPallet>,
}

/// LIFO stack of compensating actions.
///
/// Pushed after each committed side effect, unwound in reverse on failure,
/// discarded on success. An interrupted process abandons the stack; that gap
/// is documented, not handled.
struct CleanupStack<'a> {
    actions: Vec<(String, Box<dyn FnOnce() + 'a>)>,
}

impl<'a> CleanupStack<'a> {
    fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    fn push(&mut self, label: String, action: impl FnOnce() + 'a) {
        debug!("cleanup armed: {}", label);
        self.actions.push((label, Box::new(action)));
    }

    /// Run all compensations, most recent first.
    fn unwind(mut self) {
        while let Some((label, action)) = self.actions.pop() {
            warn!("rolling back: {}", label);
            action();
        }
    }

    /// Discard all compensations; the source committed.
    fn commit(mut self) {
        debug!("discarding {} cleanup action(s)", self.actions.len());
        self.actions.clear();
    }
}

/// Orchestrates the ingestion of pallet media sources
pub struct PalletIngestionPipeline<'a> {
    runner: &'a dyn ProcessRunner,
    store: Option<&'a PalletStore>,
    registry: ProberRegistry,
    options: IngestOptions,
}

impl<'a> PalletIngestionPipeline<'a> {
    /// Pipeline with the default probe set.
    pub fn new(
        runner: &'a dyn ProcessRunner,
        store: Option<&'a PalletStore>,
        options: IngestOptions,
    ) -> Self {
        Self {
            runner,
            store,
            registry: ProberRegistry::with_default_probes(),
            options,
        }
    }

    /// Pipeline with a caller-supplied probe registry.
    pub fn with_registry(
        runner: &'a dyn ProcessRunner,
        store: Option<&'a PalletStore>,
        registry: ProberRegistry,
        options: IngestOptions,
    ) -> Self {
        Self {
            runner,
            store,
            registry,
            options,
        }
    }

    /// Ingest one media source end to end.
    ///
    /// Synchronous; one source at a time. Concurrent ingestion of the same
    /// destination path is not safe and must be serialized by the caller.
    pub fn ingest(&self, source: &MediaSource) -> Result<IngestReport> {
        let fetcher = MediaFetcher::new(self.runner);

        match (source.remote, source.format) {
            (true, MediaFormat::Iso) => {
                let scratch = TempDir::new()?;
                let iso = fetcher.download(
                    &source.location,
                    self.options.username.as_deref(),
                    self.options.password.as_deref(),
                    scratch.path(),
                )?;
                debug!("{}: {}", IngestPhase::Fetched, iso.display());
                let mounted = fetcher.mount_iso(&iso)?;
                self.ingest_root(mounted.path(), &source.location)
                // mount and scratch dir release here, success or not
            }
            (false, MediaFormat::Iso) => {
                let mounted = fetcher.mount_iso(Path::new(&source.location))?;
                debug!("{}: {}", IngestPhase::Fetched, mounted.path().display());
                self.ingest_root(mounted.path(), &source.location)
            }
            (false, MediaFormat::Tree) => {
                let root = Path::new(&source.location);
                // a directory already under the pallet base is a re-add:
                // register it from its path layout instead of rsyncing the
                // tree onto itself
                if root != self.options.pallet_dir && root.starts_with(&self.options.pallet_dir) {
                    self.register_expanded(source)
                } else {
                    self.ingest_root(root, &source.location)
                }
            }
            // a remote expanded tree is re-registered from its path layout,
            // nothing is copied
            (true, MediaFormat::Tree) => self.register_expanded(source),
        }
    }

    /// Identify and ingest everything under an already-readable media root.
    pub fn ingest_root(&self, root: &Path, source_url: &str) -> Result<IngestReport> {
        let mut cleanup = CleanupStack::new();
        match self.ingest_inner(root, source_url, &mut cleanup) {
            Ok(pallets) => {
                cleanup.commit();
                info!("{}: {}", IngestPhase::Committed, source_url);
                Ok(IngestReport {
                    source: source_url.to_string(),
                    pallets,
                })
            }
            Err(e) => {
                cleanup.unwind();
                warn!("{}: {}", IngestPhase::RolledBack, source_url);
                Err(e)
            }
        }
    }

    fn ingest_inner(
        &self,
        root: &Path,
        source_url: &str,
        cleanup: &mut CleanupStack<'a>,
    ) -> Result<Vec<IngestedPallet>> {
        // native roll descriptors are authoritative; the probe registry is
        // only consulted for foreign media
        let descriptors = find_roll_descriptors(root);
        let identified: Vec<(PalletInfo, bool)> = if descriptors.is_empty() {
            vec![(self.registry.identify(root)?, false)]
        } else {
            let mut found = Vec::with_capacity(descriptors.len());
            for descriptor in &descriptors {
                found.push((parse_roll_file(descriptor)?, true));
            }
            found
        };

        for (info, _) in &identified {
            debug!("{}: {}", IngestPhase::Identified, info);
        }

        let mut ingested = Vec::with_capacity(identified.len());
        for (info, native) in identified {
            let destination = self.copy_pallet(root, &info, cleanup)?;
            debug!("{}: {}", IngestPhase::Copied, info);

            if !native && !self.options.dryrun {
                info.write_descriptor(&destination)?;
            }

            if self.options.updatedb && !self.options.dryrun {
                if let Some(store) = self.store {
                    if store.insert_if_absent(&info, source_url)? {
                        let row = info.clone();
                        cleanup.push(format!("deregister {row}"), move || {
                            if let Err(e) = store.remove(&row) {
                                warn!("could not deregister {}: {}", row, e);
                            }
                        });
                    }
                    debug!("{}: {}", IngestPhase::Registered, info);
                }
            }

            // downstream HTTP serving needs to traverse the copied tree
            if native && !self.options.dryrun {
                fixup_permissions(&destination)?;
            }

            ingested.push(IngestedPallet {
                info,
                destination,
                native,
            });
        }

        Ok(ingested)
    }

    /// Copy the media root into the pallet's destination directory.
    fn copy_pallet(
        &self,
        root: &Path,
        info: &PalletInfo,
        cleanup: &mut CleanupStack<'a>,
    ) -> Result<PathBuf> {
        let destination = info.destination(&self.options.pallet_dir);

        if destination.exists() && self.options.clean {
            info!(
                "cleaning {} {}-{} for {} from the pallets directory",
                info.name(),
                info.version(),
                info.release(),
                info.arch()
            );
            if !self.options.dryrun {
                fs::remove_dir_all(&destination)?;
            }
        }

        info!("copying {} pallet ...", info);
        if self.options.dryrun {
            return Ok(destination);
        }

        // only compensate with a delete when the destination did not exist
        // before this run; an additive copy must not destroy prior contents
        let created = !destination.exists();
        fs::create_dir_all(&destination)?;
        if created {
            let dest = destination.clone();
            cleanup.push(format!("remove {}", dest.display()), move || {
                if let Err(e) = fs::remove_dir_all(&dest) {
                    warn!("could not remove {}: {}", dest.display(), e);
                }
            });
        }

        let src = format!("{}/", root.display());
        let dst = format!("{}/", destination.display());
        let out = self.runner.run(&[
            "rsync",
            "--archive",
            "--exclude",
            COPY_EXCLUDE,
            src.as_str(),
            dst.as_str(),
        ])?;
        if !out.success() {
            return Err(Error::Copy(out.stderr));
        }

        Ok(destination)
    }

    /// Re-register an already-expanded pallet tree without copying.
    ///
    /// The trailing path components must follow the destination layout
    /// `<name>/<version>/<release>/<distro_family>/<arch>`.
    pub fn register_expanded(&self, source: &MediaSource) -> Result<IngestReport> {
        let tree_path = if source.remote {
            let parsed = Url::parse(&source.location).map_err(|e| Error::Fetch {
                url: source.location.clone(),
                reason: e.to_string(),
            })?;
            PathBuf::from(parsed.path())
        } else {
            PathBuf::from(&source.location)
        };

        let info = PalletInfo::from_expanded_tree(&tree_path)?;
        debug!("{}: {}", IngestPhase::Identified, info);

        if self.options.updatedb && !self.options.dryrun {
            if let Some(store) = self.store {
                store.insert_if_absent(&info, &source.location)?;
            }
        }

        Ok(IngestReport {
            source: source.location.clone(),
            pallets: vec![IngestedPallet {
                destination: info.destination(&self.options.pallet_dir),
                info,
                native: true,
            }],
        })
    }
}

/// Recursively grant read+traverse on every directory of a copied tree.
fn fixup_permissions(destination: &Path) -> Result<()> {
    let fixup_err =
        |e: &dyn fmt::Display| Error::PermissionFixup(format!("{}: {e}", destination.display()));

    for entry in WalkDir::new(destination) {
        let entry = entry.map_err(|e| fixup_err(&e))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let metadata = entry.metadata().map_err(|e| fixup_err(&e))?;
        let mut permissions = metadata.permissions();
        let mode = permissions.mode();
        if mode & 0o555 != 0o555 {
            permissions.set_mode(mode | 0o555);
            fs::set_permissions(entry.path(), permissions).map_err(|e| fixup_err(&e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_the_command_defaults() {
        let options = IngestOptions::default();
        assert_eq!(options.pallet_dir, PathBuf::from(DEFAULT_PALLET_DIR));
        assert!(!options.clean);
        assert!(options.updatedb);
        assert!(!options.dryrun);
    }

    #[test]
    fn cleanup_stack_unwinds_in_reverse_order() {
        use std::cell::RefCell;
        let order = RefCell::new(Vec::new());

        let mut stack = CleanupStack::new();
        stack.push("first".to_string(), || order.borrow_mut().push(1));
        stack.push("second".to_string(), || order.borrow_mut().push(2));
        stack.unwind();

        assert_eq!(*order.borrow(), vec![2, 1]);
    }

    #[test]
    fn committed_stack_runs_nothing() {
        use std::cell::Cell;
        let ran = Cell::new(false);

        let mut stack = CleanupStack::new();
        stack.push("never".to_string(), || ran.set(true));
        stack.commit();

        assert!(!ran.get());
    }

    #[test]
    fn fixup_makes_directories_traversable() {
        let dir = tempfile::tempdir().unwrap();
        let inner = dir.path().join("a/b");
        fs::create_dir_all(&inner).unwrap();
        fs::set_permissions(&inner, fs::Permissions::from_mode(0o700)).unwrap();

        fixup_permissions(dir.path()).unwrap();

        let mode = fs::metadata(&inner).unwrap().permissions().mode();
        assert_eq!(mode & 0o555, 0o555);
    }
}
