// src/probe/treeinfo.rs

//! `.treeinfo` probe for RHEL-family trees and SLES 15
//!
//! Anaconda-era installation trees carry an INI-like `.treeinfo` file whose
//! `family` key names the product. The release string defaults to
//! `<distro_family><version>` unless a `.discinfo` file is present, in which
//! case its second line wins.

use crate::pallet::PalletInfo;
use crate::probe::{Probe, ProbeOutcome};
use std::fs;
use std::path::Path;

/// Probe for `.treeinfo`-described installation trees
pub struct TreeinfoProber {
    weight: u32,
    desc: String,
}

impl TreeinfoProber {
    pub fn new() -> Self {
        Self {
            weight: 10,
            desc: "treeinfo files (rhel-based, sles15)".to_string(),
        }
    }

    /// Map a `family` value to (name, distro_family)
    fn family(value: &str) -> Option<(&'static str, &'static str)> {
        if value == "Red Hat Enterprise Linux" {
            Some(("RHEL", "redhat"))
        } else if value.starts_with("CentOS") {
            Some(("CentOS", "redhat"))
        } else if value.starts_with("Oracle") {
            Some(("OLE", "redhat"))
        } else if value.starts_with("Scientific") {
            Some(("SL", "redhat"))
        } else if value.starts_with("SUSE Linux Enterprise") {
            Some(("SLES", "sles"))
        } else {
            None
        }
    }
}

impl Default for TreeinfoProber {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for TreeinfoProber {
    fn weight(&self) -> u32 {
        self.weight
    }

    fn description(&self) -> &str {
        &self.desc
    }

    fn probe(&self, media_root: &Path) -> ProbeOutcome {
        let treeinfo = media_root.join(".treeinfo");
        if !treeinfo.exists() {
            return ProbeOutcome::NoMatch;
        }

        let contents = match fs::read_to_string(&treeinfo) {
            Ok(c) => c,
            Err(e) => return ProbeOutcome::Ambiguous(format!("unreadable .treeinfo: {e}")),
        };

        let mut name = None;
        let mut distro_family = None;
        let mut version = None;
        let mut arch = None;

        for line in contents.lines() {
            let mut kv = line.splitn(2, '=');
            let (key, value) = match (kv.next(), kv.next()) {
                (Some(k), Some(v)) => (k.trim(), v.trim()),
                _ => continue,
            };

            match key {
                "family" => {
                    if let Some((n, f)) = Self::family(value) {
                        name = Some(n.to_string());
                        distro_family = Some(f.to_string());
                    }
                }
                "version" => version = Some(value.to_string()),
                "arch" => arch = Some(value.to_string()),
                _ => {}
            }
        }

        // release defaults to family+version; a .discinfo release overrides it
        let release = match (&distro_family, &version) {
            (Some(f), Some(v)) => Some(discinfo_release(media_root).unwrap_or(format!("{f}{v}"))),
            _ => None,
        };

        match PalletInfo::from_parts(name, version, release, arch, distro_family) {
            Ok(info) => ProbeOutcome::Match(info),
            Err(e) => ProbeOutcome::Ambiguous(e.to_string()),
        }
    }
}

/// Second line of `.discinfo`, when the file exists and has one.
fn discinfo_release(media_root: &Path) -> Option<String> {
    let contents = fs::read_to_string(media_root.join(".discinfo")).ok()?;
    contents.lines().nth(1).map(|line| line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn media_with(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn centos_tree_is_identified() {
        let dir = media_with(&[(
            ".treeinfo",
            "[general]\nfamily = CentOS Linux 8\nversion = 8\narch = x86_64\n",
        )]);
        match TreeinfoProber::new().probe(dir.path()) {
            ProbeOutcome::Match(info) => {
                assert_eq!(info.name(), "CentOS");
                assert_eq!(info.distro_family(), "redhat");
                assert_eq!(info.version(), "8");
                assert_eq!(info.arch(), "x86_64");
                assert_eq!(info.release(), "redhat8");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn rhel_requires_exact_family_string() {
        let dir = media_with(&[(
            ".treeinfo",
            "family = Red Hat Enterprise Linux\nversion = 7.6\narch = x86_64\n",
        )]);
        match TreeinfoProber::new().probe(dir.path()) {
            ProbeOutcome::Match(info) => {
                assert_eq!(info.name(), "RHEL");
                assert_eq!(info.release(), "redhat7.6");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn sles15_maps_to_sles_family() {
        let dir = media_with(&[(
            ".treeinfo",
            "family = SUSE Linux Enterprise Server 15\nversion = 15\narch = x86_64\n",
        )]);
        match TreeinfoProber::new().probe(dir.path()) {
            ProbeOutcome::Match(info) => {
                assert_eq!(info.name(), "SLES");
                assert_eq!(info.distro_family(), "sles");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn discinfo_overrides_release() {
        let dir = media_with(&[
            (
                ".treeinfo",
                "family = CentOS Linux 8\nversion = 8\narch = x86_64\n",
            ),
            (".discinfo", "1556793542.258861\n8.0.1905\nx86_64\n"),
        ]);
        match TreeinfoProber::new().probe(dir.path()) {
            ProbeOutcome::Match(info) => assert_eq!(info.release(), "8.0.1905"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn missing_treeinfo_is_no_match() {
        let dir = media_with(&[("content", "NAME SUSE_SLES\n")]);
        assert_eq!(TreeinfoProber::new().probe(dir.path()), ProbeOutcome::NoMatch);
    }

    #[test]
    fn unknown_family_is_ambiguous() {
        let dir = media_with(&[(
            ".treeinfo",
            "family = Fedora\nversion = 30\narch = x86_64\n",
        )]);
        assert!(matches!(
            TreeinfoProber::new().probe(dir.path()),
            ProbeOutcome::Ambiguous(_)
        ));
    }

    #[test]
    fn missing_version_is_ambiguous() {
        let dir = media_with(&[(".treeinfo", "family = CentOS Linux 8\narch = x86_64\n")]);
        match TreeinfoProber::new().probe(dir.path()) {
            ProbeOutcome::Ambiguous(reason) => assert!(reason.contains("version")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
