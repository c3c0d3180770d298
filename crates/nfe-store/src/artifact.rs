//! # Artifact Store — Signed XML Checkpoints
//!
//! Signed XML is written to `pending/` before it is handed to the
//! transport, then moved to `sent/` or `failed/` once the outcome is known:
//!
//! ```text
//! {root}/pending/NFe_4_1710509405123.xml
//! {root}/sent/NFe_3_1710509300456.xml
//! {root}/failed/CancNFe_2_1710509100789.xml
//! ```
//!
//! Writes go to a temporary file in the target directory, are fsynced, and
//! are renamed into place; the directory is fsynced after the rename. A
//! crash leaves either the complete artifact or nothing. Moves are renames,
//! so the bytes in `sent/` are the bytes that were signed.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::StoreError;
use crate::sequence::sync_dir;

/// What the artifact contains. Selects the file name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// A signed `NFe`.
    Document,
    /// A signed cancellation `envEvento`.
    Cancellation,
    /// A signed `inutNFe`.
    VoidRange,
}

impl ArtifactKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Document => "NFe",
            Self::Cancellation => "CancNFe",
            Self::VoidRange => "InutNFe",
        }
    }
}

/// Where an artifact currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactLocation {
    Pending,
    Sent,
    Failed,
}

impl ArtifactLocation {
    pub const ALL: [ArtifactLocation; 3] = [Self::Pending, Self::Sent, Self::Failed];

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// Handle to a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub location: ArtifactLocation,
    pub file_name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open the store at `root`, creating the three locations.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for location in ArtifactLocation::ALL {
            let dir = root.join(location.dir_name());
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, location: ArtifactLocation) -> PathBuf {
        self.root.join(location.dir_name())
    }

    /// `{prefix}_{label}_{unix_millis}.xml`. The label is the document
    /// number, or `first-last` for a void range.
    pub fn file_name(kind: ArtifactKind, label: &str, unix_millis: i64) -> String {
        format!("{}_{label}_{unix_millis}.xml", kind.prefix())
    }

    /// Durably write `bytes` into `pending/`. Returns once the data and
    /// the directory entry are on disk.
    pub fn write_pending(&self, kind: ArtifactKind, label: &str, bytes: &[u8]) -> Result<Artifact, StoreError> {
        let dir = self.dir(ArtifactLocation::Pending);
        let file_name = Self::file_name(kind, label, Utc::now().timestamp_millis());
        let path = dir.join(&file_name);

        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
        temp.write_all(bytes).map_err(|e| StoreError::io(&path, e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(&path, e))?;
        temp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                StoreError::AlreadyExists { path: path.clone() }
            } else {
                StoreError::io(&path, e.error)
            }
        })?;
        sync_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;

        tracing::debug!(file = %file_name, size = bytes.len(), "artifact written to pending");
        Ok(Artifact {
            kind,
            location: ArtifactLocation::Pending,
            file_name,
            path,
        })
    }

    /// Move an artifact to `to`, keeping its name and bytes.
    pub fn move_to(&self, artifact: &Artifact, to: ArtifactLocation) -> Result<Artifact, StoreError> {
        if artifact.location == to {
            return Ok(artifact.clone());
        }
        if !artifact.path.exists() {
            return Err(StoreError::NotFound {
                path: artifact.path.clone(),
            });
        }
        let dir = self.dir(to);
        let path = dir.join(&artifact.file_name);
        if path.exists() {
            return Err(StoreError::AlreadyExists { path });
        }
        fs::rename(&artifact.path, &path).map_err(|e| StoreError::io(&artifact.path, e))?;
        sync_dir(&dir).map_err(|e| StoreError::io(&dir, e))?;
        if let Some(from) = artifact.path.parent() {
            sync_dir(from).map_err(|e| StoreError::io(from, e))?;
        }

        tracing::debug!(file = %artifact.file_name, to = to.dir_name(), "artifact moved");
        Ok(Artifact {
            kind: artifact.kind,
            location: to,
            file_name: artifact.file_name.clone(),
            path,
        })
    }

    pub fn read(&self, artifact: &Artifact) -> Result<Vec<u8>, StoreError> {
        fs::read(&artifact.path).map_err(|e| StoreError::io(&artifact.path, e))
    }

    /// Artifact file names in `location`, sorted.
    pub fn list(&self, location: ArtifactLocation) -> Result<Vec<String>, StoreError> {
        let dir = self.dir(location);
        let mut names = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| StoreError::io(&dir, e))? {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".xml") {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }
}
