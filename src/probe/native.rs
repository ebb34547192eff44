// src/probe/native.rs

//! Native roll descriptor probe
//!
//! Native pallets carry a `roll-<name>.xml` descriptor: root element `roll`
//! with a `name` attribute and a child `info` element holding `version`,
//! `release`, `arch` and `os`. The probe matches only when exactly one
//! descriptor exists under the media root; a disc bundling several rolls is
//! handled by the ingestion pipeline, which parses each descriptor
//! independently via [`parse_roll_file`].

use crate::error::{Error, Result};
use crate::pallet::PalletInfo;
use crate::probe::{Probe, ProbeOutcome};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Probe for native roll descriptors
pub struct NativeRollProber {
    weight: u32,
    desc: String,
}

impl NativeRollProber {
    pub fn new() -> Self {
        Self {
            weight: 10,
            desc: "roll.xml files (native)".to_string(),
        }
    }
}

impl Default for NativeRollProber {
    fn default() -> Self {
        Self::new()
    }
}

impl Probe for NativeRollProber {
    fn weight(&self) -> u32 {
        self.weight
    }

    fn description(&self) -> &str {
        &self.desc
    }

    fn probe(&self, media_root: &Path) -> ProbeOutcome {
        let descriptors = find_roll_descriptors(media_root);

        // zero is plainly not native; more than one means this disc bundles
        // several rolls and cannot be described by a single PalletInfo
        if descriptors.len() != 1 {
            return ProbeOutcome::NoMatch;
        }

        match parse_roll_file(&descriptors[0]) {
            Ok(info) => ProbeOutcome::Match(info),
            Err(e) => ProbeOutcome::Ambiguous(format!(
                "{}: {}",
                descriptors[0].display(),
                e
            )),
        }
    }
}

/// Find every `roll-*.xml` descriptor under `root`, in stable path order.
pub fn find_roll_descriptors(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.starts_with("roll-") && name.ends_with(".xml")
        })
        .map(|entry| entry.into_path())
        .collect();
    found.sort();
    found
}

/// Parse one roll descriptor into a `PalletInfo`.
pub fn parse_roll_file(path: &Path) -> Result<PalletInfo> {
    let mut reader = Reader::from_file(path)
        .map_err(|e| Error::Other(format!("cannot read {}: {e}", path.display())))?;

    let mut name = None;
    let mut version = None;
    let mut release = None;
    let mut arch = None;
    let mut distro_family = None;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"roll" => {
                    for attr in e.attributes().flatten() {
                        if attr.key.as_ref() == b"name" {
                            name = Some(unescape(path, &attr)?);
                        }
                    }
                }
                b"info" => {
                    for attr in e.attributes().flatten() {
                        let value = unescape(path, &attr)?;
                        match attr.key.as_ref() {
                            b"version" => version = Some(value),
                            b"release" => release = Some(value),
                            b"arch" => arch = Some(value),
                            b"os" => distro_family = Some(value),
                            _ => {}
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::Other(format!(
                    "malformed roll descriptor {}: {e}",
                    path.display()
                )))
            }
        }
        buf.clear();
    }

    PalletInfo::from_parts(name, version, release, arch, distro_family)
}

fn unescape(path: &Path, attr: &quick_xml::events::attributes::Attribute<'_>) -> Result<String> {
    attr.unescape_value()
        .map(|v| v.into_owned())
        .map_err(|e| Error::Other(format!("malformed roll descriptor {}: {e}", path.display())))
}
