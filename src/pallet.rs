// src/pallet.rs

//! Pallet metadata value types
//!
//! A pallet is a named, versioned software bundle (an OS tree or an addon
//! package set) installable onto cluster nodes. `PalletInfo` is the immutable
//! result of identifying one piece of installation media; the ingestion
//! pipeline consumes it to build the destination path and the database row.

use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Identified pallet metadata.
///
/// All five fields are guaranteed non-empty; construction fails otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PalletInfo {
    name: String,
    version: String,
    release: String,
    arch: String,
    distro_family: String,
}

impl PalletInfo {
    /// Create a new `PalletInfo`, validating that every field is non-empty.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        release: impl Into<String>,
        arch: impl Into<String>,
        distro_family: impl Into<String>,
    ) -> Result<Self> {
        let info = Self {
            name: name.into(),
            version: version.into(),
            release: release.into(),
            arch: arch.into(),
            distro_family: distro_family.into(),
        };

        let missing: Vec<&str> = [
            ("name", &info.name),
            ("version", &info.version),
            ("release", &info.release),
            ("arch", &info.arch),
            ("distro_family", &info.distro_family),
        ]
        .iter()
        .filter(|(_, v)| v.is_empty())
        .map(|(k, _)| *k)
        .collect();

        if missing.is_empty() {
            Ok(info)
        } else {
            Err(Error::IncompletePallet(format!(
                "missing {}",
                missing.join(", ")
            )))
        }
    }

    /// Like `new`, but accepts `Option` fields from partial parses.
    pub fn from_parts(
        name: Option<String>,
        version: Option<String>,
        release: Option<String>,
        arch: Option<String>,
        distro_family: Option<String>,
    ) -> Result<Self> {
        Self::new(
            name.unwrap_or_default(),
            version.unwrap_or_default(),
            release.unwrap_or_default(),
            arch.unwrap_or_default(),
            distro_family.unwrap_or_default(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn release(&self) -> &str {
        &self.release
    }

    pub fn arch(&self) -> &str {
        &self.arch
    }

    /// Coarse OS lineage ("redhat", "sles", or a native roll's os field)
    pub fn distro_family(&self) -> &str {
        &self.distro_family
    }

    /// Destination directory for this pallet under the pallets base directory:
    /// `<base>/<name>/<version>/<release>/<distro_family>/<arch>`
    pub fn destination(&self, base: &Path) -> PathBuf {
        base.join(&self.name)
            .join(&self.version)
            .join(&self.release)
            .join(&self.distro_family)
            .join(&self.arch)
    }

    /// Re-parse an already-expanded pallet directory back into a `PalletInfo`.
    ///
    /// The trailing five path components must be
    /// `<name>/<version>/<release>/<distro_family>/<arch>`. Used for the
    /// re-add case where files are already in place and only the database
    /// row is written.
    pub fn from_expanded_tree(path: &Path) -> Result<Self> {
        let parts: Vec<String> = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        if parts.len() < 5 {
            return Err(Error::Other(format!(
                "unable to parse pallet directory structure: {}",
                path.display()
            )));
        }

        let tail = &parts[parts.len() - 5..];
        Self::new(
            tail[0].clone(),
            tail[1].clone(),
            tail[2].clone(),
            tail[4].clone(),
            tail[3].clone(),
        )
    }

    /// Write a minimal `roll-<name>.xml` descriptor into `dir`.
    ///
    /// Foreign pallets get one after the copy so a later re-add identifies
    /// them as native.
    pub fn write_descriptor(&self, dir: &Path) -> Result<()> {
        let xml = format!(
            "<roll name=\"{}\" interface=\"6.0.2\">\n\
             <color edge=\"white\" node=\"white\"/>\n\
             <info version=\"{}\" release=\"{}\" arch=\"{}\" os=\"{}\"/>\n\
             <iso maxsize=\"0\" addcomps=\"0\" bootable=\"0\"/>\n\
             <rpm rolls=\"0\" bin=\"1\" src=\"0\"/>\n\
             </roll>\n",
            self.name, self.version, self.release, self.arch, self.distro_family
        );
        fs::write(dir.join(format!("roll-{}.xml", self.name)), xml)?;
        Ok(())
    }
}

impl fmt::Display for PalletInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{} ({}, {})",
            self.name, self.version, self.release, self.arch, self.distro_family
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_info_round_trips() {
        let info = PalletInfo::new("kernel", "7.0", "1", "x86_64", "redhat").unwrap();
        assert_eq!(info.name(), "kernel");
        assert_eq!(info.version(), "7.0");
        assert_eq!(info.release(), "1");
        assert_eq!(info.arch(), "x86_64");
        assert_eq!(info.distro_family(), "redhat");
    }

    #[test]
    fn empty_field_is_rejected() {
        let err = PalletInfo::new("kernel", "", "1", "x86_64", "redhat").unwrap_err();
        match err {
            Error::IncompletePallet(msg) => assert!(msg.contains("version")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn from_parts_reports_all_missing_fields() {
        let err = PalletInfo::from_parts(
            Some("SLES".into()),
            None,
            None,
            Some("x86_64".into()),
            Some("sles".into()),
        )
        .unwrap_err();
        match err {
            Error::IncompletePallet(msg) => {
                assert!(msg.contains("version"));
                assert!(msg.contains("release"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn destination_layout() {
        let info = PalletInfo::new("CentOS", "8", "redhat8", "x86_64", "redhat").unwrap();
        assert_eq!(
            info.destination(Path::new("/export/stack/pallets")),
            Path::new("/export/stack/pallets/CentOS/8/redhat8/redhat/x86_64")
        );
    }

    #[test]
    fn expanded_tree_round_trip() {
        let info = PalletInfo::new("CentOS", "8", "redhat8", "x86_64", "redhat").unwrap();
        let dest = info.destination(Path::new("/export/stack/pallets"));
        assert_eq!(PalletInfo::from_expanded_tree(&dest).unwrap(), info);
    }

    #[test]
    fn short_path_is_rejected() {
        assert!(PalletInfo::from_expanded_tree(Path::new("a/b")).is_err());
    }

    #[test]
    fn descriptor_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let info = PalletInfo::new("SLES", "12", "sp2", "x86_64", "sles").unwrap();
        info.write_descriptor(dir.path()).unwrap();
        let xml = std::fs::read_to_string(dir.path().join("roll-SLES.xml")).unwrap();
        assert!(xml.contains("name=\"SLES\""));
        assert!(xml.contains("version=\"12\""));
        assert!(xml.contains("os=\"sles\""));
    }
}
