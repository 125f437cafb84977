//! Identifier to artifact mapping.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::model::ArtifactSet;
use crate::QcError;

/// Shortest identifier the directory convention can split.
pub const MIN_IDENTIFIER_LEN: usize = 15;

/// Species screening report file name.
pub const SPECIES_REPORT_FILE: &str = "input_screen.txt";
/// FastQC archive file name.
pub const FASTQC_ARCHIVE_FILE: &str = "stdin_fastqc.zip";
/// Encrypted stats file name.
pub const STATS_CIPHER_FILE: &str = "stats.txt.openssl.gz";
/// Password file name.
pub const KEY_FILE: &str = "key";

/// Supplies the raw artifacts for an identifier.
pub trait ArtifactSource: Send + Sync {
    /// Artifacts for `identifier`; absent files are `None`.
    fn resolve(&self, identifier: &str) -> Result<ArtifactSet, QcError>;
}

/// Archive directory convention:
/// `<root>/<id[0..9]>/<id[9..12]>/<id[12..15]>/execution/`.
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    root: PathBuf,
}

impl ArchiveLayout {
    /// Layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Archive root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Execution directory holding the artifacts of `identifier`.
    pub fn execution_dir(&self, identifier: &str) -> Result<PathBuf, QcError> {
        if identifier.len() < MIN_IDENTIFIER_LEN
            || !identifier.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(QcError::MissingArtifact(format!(
                "identifier '{identifier}' does not map to an archive directory"
            )));
        }
        Ok(self
            .root
            .join(&identifier[..9])
            .join(&identifier[9..12])
            .join(&identifier[12..15])
            .join("execution"))
    }

    /// JSON summary file name for `identifier`.
    pub fn summary_file(identifier: &str) -> String {
        format!("{identifier}_report.json.gz")
    }
}

impl ArtifactSource for ArchiveLayout {
    fn resolve(&self, identifier: &str) -> Result<ArtifactSet, QcError> {
        let dir = self.execution_dir(identifier)?;
        trace!(identifier, dir = %dir.display(), "resolving artifacts");
        Ok(ArtifactSet {
            summary_json: read_optional(&dir.join(Self::summary_file(identifier)))?,
            fastq_archive: read_optional(&dir.join(FASTQC_ARCHIVE_FILE))?,
            stats_cipher: read_optional(&dir.join(STATS_CIPHER_FILE))?,
            cipher_key: read_optional(&dir.join(KEY_FILE))?.map(trim_key),
            species_report: read_optional(&dir.join(SPECIES_REPORT_FILE))?,
        })
    }
}

fn trim_key(key: Vec<u8>) -> Vec<u8> {
    let start = key.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(key.len());
    let end = key.iter().rposition(|b| !b.is_ascii_whitespace()).map_or(start, |i| i + 1);
    key[start..end].to_vec()
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, QcError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(QcError::MissingArtifact(format!(
            "{} unreadable: {err}",
            path.display()
        ))),
    }
}

/// In-memory artifacts keyed by identifier. Unknown identifiers resolve to
/// an empty set.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    units: HashMap<String, ArtifactSet>,
}

impl MemorySource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the artifacts of `identifier`.
    pub fn insert(&mut self, identifier: impl Into<String>, artifacts: ArtifactSet) {
        self.units.insert(identifier.into(), artifacts);
    }

    /// Builder form of [`MemorySource::insert`].
    pub fn with(mut self, identifier: impl Into<String>, artifacts: ArtifactSet) -> Self {
        self.insert(identifier, artifacts);
        self
    }
}

impl ArtifactSource for MemorySource {
    fn resolve(&self, identifier: &str) -> Result<ArtifactSet, QcError> {
        Ok(self.units.get(identifier).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_identifier_into_directories() {
        let layout = ArchiveLayout::new("/archive");
        let dir = layout.execution_dir("EGAF00001234567").unwrap();
        assert_eq!(dir, PathBuf::from("/archive/EGAF00001/234/567/execution"));
    }

    #[test]
    fn short_identifiers_are_missing() {
        let layout = ArchiveLayout::new("/archive");
        assert!(matches!(
            layout.execution_dir("EGAF1"),
            Err(QcError::MissingArtifact(_))
        ));
    }

    #[test]
    fn path_characters_never_leave_the_root() {
        let layout = ArchiveLayout::new("/archive");
        for identifier in ["../../../../etc/x", "EGAF0000/../../1234", "EGAF 0000 1234 567"] {
            assert!(
                matches!(layout.execution_dir(identifier), Err(QcError::MissingArtifact(_))),
                "{identifier} was accepted"
            );
        }
    }

    #[test]
    fn reads_present_files_and_trims_key() {
        let root = tempfile::tempdir().unwrap();
        let layout = ArchiveLayout::new(root.path());
        let dir = layout.execution_dir("EGAF00001234567").unwrap();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(KEY_FILE), b"secret\n").unwrap();
        fs::write(dir.join(FASTQC_ARCHIVE_FILE), b"zip").unwrap();

        let set = layout.resolve("EGAF00001234567").unwrap();
        assert_eq!(set.cipher_key.as_deref(), Some(&b"secret"[..]));
        assert_eq!(set.fastq_archive.as_deref(), Some(&b"zip"[..]));
        assert!(set.summary_json.is_none());
        assert!(set.species_report.is_none());
    }
}
