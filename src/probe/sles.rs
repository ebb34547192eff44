// src/probe/sles.rs

//! `content` file probe for SLES 11 and 12 media
//!
//! Two historical formats live in the same file. SLES 11 ISOs use plain
//! `KEY value` lines (`NAME`, `VERSION`, `RELEASE`, `BASEARCHS`); SLES 12
//! ISOs describe the product with a `DISTRO` line of the form
//! `cpe:/o:<vendor>:<product>:<version>[:<release>],<label>`.

use crate::pallet::PalletInfo;
use crate::probe::{Probe, ProbeOutcome};
use std::fs;
use std::path::Path;

/// Probe for SLES 11/12 `content` files
pub struct Sles11_12Prober {
    weight: u32,
    desc: String,
}

impl Sles11_12Prober {
    pub fn new() -> Self {
        Self {
            weight: 30,
            desc: "sles 11-12".to_string(),
        }
    }
}

impl Default for Sles11_12Prober {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for Sles11_12Prober {
    fn weight(&self) -> u32 {
        self.weight
    }

    fn description(&self) -> &str {
        &self.desc
    }

    fn probe(&self, media_root: &Path) -> ProbeOutcome {
        let content = media_root.join("content");
        if !content.exists() {
            return ProbeOutcome::NoMatch;
        }

        let contents = match fs::read_to_string(&content) {
            Ok(c) => c,
            Err(e) => return ProbeOutcome::Ambiguous(format!("unreadable content file: {e}")),
        };

        let mut name: Option<String> = None;
        let mut version: Option<String> = None;
        let mut release: Option<String> = None;
        let mut arch = "x86_64".to_string();

        for line in contents.lines() {
            let mut parts = line.splitn(2, char::is_whitespace);
            let (key, value) = match (parts.next(), parts.next()) {
                (Some(k), Some(v)) => (k.trim(), v.trim()),
                _ => continue,
            };

            match key {
                // SLES11 ISOs
                "NAME" => {
                    if value == "SUSE_SLES" {
                        name = Some("SLES".to_string());
                    } else if value == "sle-sdk" {
                        name = Some("SLE-SDK".to_string());
                    }
                }
                "VERSION" => version = Some(value.to_string()),
                "RELEASE" => release = Some(value.to_string()),
                "BASEARCHS" => arch = value.to_string(),

                // SLES12 ISOs
                "DISTRO" => {
                    let cpe = value.split(',').next().unwrap_or_default();
                    let fields: Vec<&str> = cpe.split(':').collect();
                    if fields.len() < 5 {
                        continue;
                    }

                    name = match fields[3] {
                        "sles" => Some("SLES".to_string()),
                        "sle-sdk" => Some("SLE-SDK".to_string()),
                        "ses" => Some("SUSE-Enterprise-Storage".to_string()),
                        _ => None,
                    };

                    if name.is_some() {
                        version = Some(fields[4].to_string());
                        release = fields.get(5).map(|r| r.to_string());
                        break;
                    }
                }
                _ => {}
            }
        }

        match PalletInfo::from_parts(
            name,
            version,
            release,
            Some(arch),
            Some("sles".to_string()),
        ) {
            Ok(info) => ProbeOutcome::Match(info),
            Err(e) => ProbeOutcome::Ambiguous(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn media_with_content(content: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("content"), content).unwrap();
        dir
    }

    #[test]
    fn sles11_legacy_keys() {
        let dir = media_with_content(
            "NAME SUSE_SLES\nVERSION 11.3\nRELEASE 1.234\nBASEARCHS x86_64\n",
        );
        match Sles11_12Prober::new().probe(dir.path()) {
            ProbeOutcome::Match(info) => {
                assert_eq!(info.name(), "SLES");
                assert_eq!(info.version(), "11.3");
                assert_eq!(info.release(), "1.234");
                assert_eq!(info.arch(), "x86_64");
                assert_eq!(info.distro_family(), "sles");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn sles12_distro_line() {
        let dir = media_with_content(
            "DISTRO cpe:/o:suse:sles:12:sp2,SUSE Linux Enterprise Server 12 SP2\n",
        );
        match Sles11_12Prober::new().probe(dir.path()) {
            ProbeOutcome::Match(info) => {
                assert_eq!(info.name(), "SLES");
                assert_eq!(info.version(), "12");
                assert_eq!(info.release(), "sp2");
                assert_eq!(info.arch(), "x86_64");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn ses_product_token() {
        let dir = media_with_content(
            "DISTRO cpe:/o:suse:ses:5:1,SUSE Enterprise Storage 5\n",
        );
        match Sles11_12Prober::new().probe(dir.path()) {
            ProbeOutcome::Match(info) => assert_eq!(info.name(), "SUSE-Enterprise-Storage"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn distro_line_without_release_is_ambiguous() {
        // caasp-style media: recognizable but the release field is absent
        let dir = media_with_content(
            "DISTRO cpe:/o:suse:sles:12,SUSE Linux Enterprise Server 12\n",
        );
        match Sles11_12Prober::new().probe(dir.path()) {
            ProbeOutcome::Ambiguous(reason) => assert!(reason.contains("release")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn unknown_product_is_ambiguous() {
        let dir = media_with_content(
            "DISTRO cpe:/o:suse:caasp:1.0,SUSE Container as a Service Platform 1.0\n",
        );
        assert!(matches!(
            Sles11_12Prober::new().probe(dir.path()),
            ProbeOutcome::Ambiguous(_)
        ));
    }

    #[test]
    fn missing_content_file_is_no_match() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Sles11_12Prober::new().probe(dir.path()), ProbeOutcome::NoMatch);
    }
}
