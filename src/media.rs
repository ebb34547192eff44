// src/media.rs

//! Media sources: classification, remote fetch, ISO mounting
//!
//! A pallet source named on the command line can be a local ISO, a local
//! directory, a remote ISO, or a remote expanded tree. `MediaFetcher` turns
//! ISO sources into a readable media root: remote ISOs are streamed to a
//! scratch directory first, then mounted read-only on a temporary mountpoint.
//! Mounting is defensive: a stale mount of the same ISO is unmounted (with a
//! warning) before mounting again.

use crate::error::{Error, Result};
use crate::exec::ProcessRunner;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use url::Url;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Default mountpoint checked when no sources are named
pub const CDROM_MOUNTPOINT: &str = "/mnt/cdrom";

/// What a source argument points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    /// An ISO image that must be mounted
    Iso,
    /// An already-expanded directory tree
    Tree,
}

/// One pallet source named on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    pub location: String,
    pub format: MediaFormat,
    pub remote: bool,
}

impl MediaSource {
    /// Classify a command-line argument as a media source.
    ///
    /// Remote sources are `http`/`ftp` URLs; everything else must exist
    /// locally as an `.iso` file or a directory.
    pub fn classify(arg: &str) -> Result<Self> {
        if arg.starts_with("http") || arg.starts_with("ftp") {
            let format = if arg.ends_with(".iso") {
                MediaFormat::Iso
            } else {
                MediaFormat::Tree
            };
            return Ok(Self {
                location: arg.to_string(),
                format,
                remote: true,
            });
        }

        let path = if Path::new(arg).is_absolute() {
            PathBuf::from(arg)
        } else {
            env::current_dir()?.join(arg)
        };

        if path.is_file() && arg.ends_with(".iso") {
            Ok(Self {
                location: path.to_string_lossy().into_owned(),
                format: MediaFormat::Iso,
                remote: false,
            })
        } else if path.is_dir() {
            Ok(Self {
                location: path.to_string_lossy().into_owned(),
                format: MediaFormat::Tree,
                remote: false,
            })
        } else {
            Err(Error::UnknownSource(arg.to_string()))
        }
    }
}

/// A mounted ISO; unmounts on drop.
pub struct MountedIso<'a> {
    runner: &'a dyn ProcessRunner,
    mountpoint: TempDir,
}

impl MountedIso<'_> {
    /// The media root where the ISO contents are visible
    pub fn path(&self) -> &Path {
        self.mountpoint.path()
    }
}

impl Drop for MountedIso<'_> {
    fn drop(&mut self) {
        let mountpoint = self.mountpoint.path().to_string_lossy().into_owned();
        match self.runner.run(&["umount", mountpoint.as_str()]) {
            Ok(out) if out.success() => debug!("unmounted {}", mountpoint),
            Ok(out) => warn!("failed to unmount {}: {}", mountpoint, out.stderr.trim()),
            Err(e) => warn!("failed to unmount {}: {}", mountpoint, e),
        }
    }
}

/// Produces readable media roots from source descriptors
pub struct MediaFetcher<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> MediaFetcher<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }

    /// Download a remote ISO into `dest_dir`, streaming with a progress bar.
    pub fn download(
        &self,
        source_url: &str,
        username: Option<&str>,
        password: Option<&str>,
        dest_dir: &Path,
    ) -> Result<PathBuf> {
        let fetch_err = |reason: String| Error::Fetch {
            url: source_url.to_string(),
            reason,
        };

        let parsed = Url::parse(source_url).map_err(|e| fetch_err(e.to_string()))?;
        let filename = parsed
            .path_segments()
            .and_then(|segments| segments.last())
            .filter(|s| !s.is_empty())
            .unwrap_or("pallet.iso")
            .to_string();
        let dest_path = dest_dir.join(&filename);

        info!("fetching {} -> {}", source_url, dest_path.display());

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| fetch_err(e.to_string()))?;

        let mut request = client.get(source_url);
        if let Some(user) = username {
            request = request.basic_auth(user, password);
        }

        let mut response = request.send().map_err(|e| fetch_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_err(format!("HTTP {}", response.status())));
        }

        let total_size = response.content_length().unwrap_or(0);
        let progress = if total_size > 0 {
            let pb = ProgressBar::new(total_size);
            pb.set_style(
                ProgressStyle::with_template(
                    "{msg} [{bar:40}] {bytes}/{total_bytes} ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb.set_message(filename.clone());
            Some(pb)
        } else {
            None
        };

        let mut file = File::create(&dest_path)?;
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        let mut downloaded: u64 = 0;
        loop {
            let n = response
                .read(&mut buffer)
                .map_err(|e| fetch_err(e.to_string()))?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])?;
            downloaded += n as u64;
            if let Some(pb) = &progress {
                pb.set_position(downloaded);
            }
        }
        if let Some(pb) = &progress {
            pb.finish_and_clear();
        }

        info!("fetched {} ({} bytes)", filename, downloaded);
        Ok(dest_path)
    }

    /// Mount an ISO read-only on a temporary mountpoint.
    ///
    /// If the ISO already appears in the mount table (a stale mount from an
    /// interrupted run), the stale mountpoint is unmounted first.
    pub fn mount_iso(&self, iso: &Path) -> Result<MountedIso<'a>> {
        self.unmount_stale(iso)?;

        let mountpoint = TempDir::new()?;
        let iso_str = iso.to_string_lossy().into_owned();
        let mp_str = mountpoint.path().to_string_lossy().into_owned();

        // readonly explicitly, to get around sles12 refusing to re-mount
        // an already mounted iso
        let out = self
            .runner
            .run(&["mount", "--read-only", iso_str.as_str(), mp_str.as_str()])?;
        if !out.success() {
            return Err(Error::Mount {
                path: iso.to_path_buf(),
                reason: out.stderr.trim().to_string(),
            });
        }

        debug!("mounted {} on {}", iso_str, mp_str);
        Ok(MountedIso {
            runner: self.runner,
            mountpoint,
        })
    }

    /// Unmount any existing mounts of `iso`, warning about each.
    fn unmount_stale(&self, iso: &Path) -> Result<()> {
        let out = self.runner.run(&["mount"])?;
        if !out.success() {
            return Ok(());
        }

        let iso_str = iso.to_string_lossy();
        for line in out.stdout.lines() {
            // mount table lines read "<source> on <target> type <fs> (...)"
            let mut parts = line.split(" on ");
            let source = parts.next().unwrap_or_default().trim();
            if source != iso_str {
                continue;
            }
            let target = parts
                .next()
                .and_then(|rest| rest.split(" type ").next())
                .unwrap_or_default()
                .trim();
            if target.is_empty() {
                continue;
            }

            warn!("{} is already mounted on {}, unmounting stale mount", iso_str, target);
            let umount = self.runner.run(&["umount", target])?;
            if !umount.success() {
                return Err(Error::Mount {
                    path: iso.to_path_buf(),
                    reason: format!(
                        "could not unmount stale mount at {}: {}",
                        target,
                        umount.stderr.trim()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Whether anything is mounted at `/mnt/cdrom` (the no-argument case).
    pub fn cdrom_mounted(&self) -> Result<bool> {
        let out = self.runner.run(&["mount"])?;
        Ok(out.success()
            && out
                .stdout
                .lines()
                .any(|line| line.contains(&format!(" on {} type ", CDROM_MOUNTPOINT))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use std::cell::RefCell;
    use std::fs;

    /// Scripted runner: canned output per program name, records every call.
    struct ScriptedRunner {
        mount_table: String,
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        fn new(mount_table: &str) -> Self {
            Self {
                mount_table: mount_table.to_string(),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.borrow().clone()
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run(&self, argv: &[&str]) -> crate::error::Result<CommandOutput> {
            self.calls
                .borrow_mut()
                .push(argv.iter().map(|s| s.to_string()).collect());
            if argv == ["mount"] {
                Ok(CommandOutput::new(0, self.mount_table.clone(), ""))
            } else {
                Ok(CommandOutput::new(0, "", ""))
            }
        }
    }

    #[test]
    fn remote_iso_classification() {
        let source = MediaSource::classify("http://mirror.example.com/os-7.0.iso").unwrap();
        assert_eq!(source.format, MediaFormat::Iso);
        assert!(source.remote);
    }

    #[test]
    fn remote_tree_classification() {
        let source = MediaSource::classify("ftp://mirror.example.com/pallets/os").unwrap();
        assert_eq!(source.format, MediaFormat::Tree);
        assert!(source.remote);
    }

    #[test]
    fn local_iso_and_dir_classification() {
        let dir = TempDir::new().unwrap();
        let iso = dir.path().join("kernel.iso");
        fs::write(&iso, b"").unwrap();

        let source = MediaSource::classify(iso.to_str().unwrap()).unwrap();
        assert_eq!(source.format, MediaFormat::Iso);
        assert!(!source.remote);

        let source = MediaSource::classify(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(source.format, MediaFormat::Tree);
    }

    #[test]
    fn missing_local_source_is_rejected() {
        assert!(matches!(
            MediaSource::classify("/no/such/thing.iso"),
            Err(Error::UnknownSource(_))
        ));
    }

    #[test]
    fn stale_mount_is_unmounted_before_mounting() {
        let runner = ScriptedRunner::new(
            "/export/kernel.iso on /run/media/stale type iso9660 (ro)\n\
             /dev/sda1 on / type ext4 (rw)\n",
        );
        let fetcher = MediaFetcher::new(&runner);
        let mounted = fetcher.mount_iso(Path::new("/export/kernel.iso")).unwrap();
        drop(mounted);

        let calls = runner.calls();
        assert_eq!(calls[0], ["mount"]);
        assert_eq!(calls[1], ["umount", "/run/media/stale"]);
        assert_eq!(calls[2][..2], ["mount".to_string(), "--read-only".to_string()]);
        // drop unmounts the fresh mountpoint
        assert_eq!(calls[3][0], "umount");
    }

    #[test]
    fn clean_mount_issues_no_stale_unmount() {
        let runner = ScriptedRunner::new("/dev/sda1 on / type ext4 (rw)\n");
        let fetcher = MediaFetcher::new(&runner);
        let mounted = fetcher.mount_iso(Path::new("/export/kernel.iso")).unwrap();
        drop(mounted);

        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1][0], "mount");
    }

    #[test]
    fn cdrom_detection() {
        let runner =
            ScriptedRunner::new("/dev/sr0 on /mnt/cdrom type iso9660 (ro,relatime)\n");
        assert!(MediaFetcher::new(&runner).cdrom_mounted().unwrap());

        let runner = ScriptedRunner::new("/dev/sda1 on / type ext4 (rw)\n");
        assert!(!MediaFetcher::new(&runner).cdrom_mounted().unwrap());
    }
}
