//! # Sequence Allocator — Gap-Free Document Numbers
//!
//! One counter per (series, environment), held in its own JSON file and
//! rewritten atomically under an exclusive lock:
//!
//! ```text
//! {dir}/series-001-homologation.json   {"next": 5, ...}
//! {dir}/series-001-homologation.lock
//! ```
//!
//! The lock is an OS advisory lock on a sidecar file, so concurrent
//! callers in this process, in other processes, and across restarts all
//! serialize on the same counter. The file is authoritative; nothing is
//! cached in memory.
//!
//! A number is consumed the moment `next_number` returns. It is never
//! handed out again, whatever happens to the document that received it.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use nfe_core::{DocumentNumber, SequenceKey};

use crate::error::SequencingError;

/// Source of document numbers.
pub trait SequenceAllocator: Send + Sync {
    /// Consume and return the next number for `key`.
    fn next_number(&self, key: SequenceKey) -> Result<DocumentNumber, SequencingError>;

    /// The number the next call to [`next_number`](Self::next_number)
    /// would return, without consuming it.
    fn peek(&self, key: SequenceKey) -> Result<DocumentNumber, SequencingError>;

    /// Raise the counter so the next number is at least `next`. Never
    /// lowers it. Returns the resulting next number.
    fn advance_to(&self, key: SequenceKey, next: DocumentNumber) -> Result<DocumentNumber, SequencingError>;
}

/// Persisted counter state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CounterFile {
    series: u16,
    environment: String,
    /// Next number to hand out.
    next: u32,
    updated_at: DateTime<Utc>,
}

/// File-backed allocator. Cheap to clone; clones share the directory.
#[derive(Debug, Clone)]
pub struct FileSequenceAllocator {
    dir: PathBuf,
}

impl FileSequenceAllocator {
    /// Use `dir` for counter files, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SequencingError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SequencingError::Storage {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn counter_path(&self, key: SequenceKey) -> PathBuf {
        self.dir
            .join(format!("series-{}-{}.json", key.series.padded(), key.environment))
    }

    fn lock_path(&self, key: SequenceKey) -> PathBuf {
        self.dir
            .join(format!("series-{}-{}.lock", key.series.padded(), key.environment))
    }

    /// Run `op` on the current `next` value under the exclusive lock and
    /// persist the value it returns.
    fn with_counter<T>(
        &self,
        key: SequenceKey,
        op: impl FnOnce(u32) -> Result<(u32, T), SequencingError>,
    ) -> Result<T, SequencingError> {
        let lock_path = self.lock_path(key);
        let storage = |path: &Path| {
            let path = path.to_path_buf();
            move |source| SequencingError::Storage { path, source }
        };
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(storage(&lock_path))?;
        FileExt::lock_exclusive(&lock).map_err(storage(&lock_path))?;

        let path = self.counter_path(key);
        let current = read_counter(&path)?.map_or(1, |c| c.next);
        let (next, value) = op(current)?;
        if next != current {
            write_counter(
                &path,
                &CounterFile {
                    series: key.series.get(),
                    environment: key.environment.to_string(),
                    next,
                    updated_at: Utc::now(),
                },
            )?;
        }
        drop(lock);
        Ok(value)
    }
}

impl SequenceAllocator for FileSequenceAllocator {
    fn next_number(&self, key: SequenceKey) -> Result<DocumentNumber, SequencingError> {
        let allocated = self.with_counter(key, |current| {
            if current > DocumentNumber::MAX {
                return Err(SequencingError::Exhausted { key });
            }
            Ok((current + 1, current))
        })?;
        tracing::debug!(series = %key.series, environment = %key.environment, number = allocated, "number allocated");
        number(key, allocated)
    }

    fn peek(&self, key: SequenceKey) -> Result<DocumentNumber, SequencingError> {
        let path = self.counter_path(key);
        let next = read_counter(&path)?.map_or(1, |c| c.next);
        number(key, next)
    }

    fn advance_to(&self, key: SequenceKey, next: DocumentNumber) -> Result<DocumentNumber, SequencingError> {
        self.with_counter(key, |current| {
            let target = current.max(next.get());
            Ok((target, target))
        })
        .and_then(|n| number(key, n))
    }
}

fn number(key: SequenceKey, value: u32) -> Result<DocumentNumber, SequencingError> {
    DocumentNumber::new(value).map_err(|_| SequencingError::Exhausted { key })
}

fn read_counter(path: &Path) -> Result<Option<CounterFile>, SequencingError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SequencingError::Storage {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let counter: CounterFile = serde_json::from_slice(&bytes).map_err(|e| SequencingError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if counter.next == 0 {
        return Err(SequencingError::Corrupt {
            path: path.to_path_buf(),
            reason: "next number is zero".into(),
        });
    }
    Ok(Some(counter))
}

fn write_counter(path: &Path, counter: &CounterFile) -> Result<(), SequencingError> {
    let storage = |source| SequencingError::Storage {
        path: path.to_path_buf(),
        source,
    };
    let payload = serde_json::to_vec_pretty(counter).map_err(|e| SequencingError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(storage)?;
    temp.write_all(&payload).map_err(storage)?;
    temp.as_file().sync_all().map_err(storage)?;
    temp.persist(path).map_err(|e| storage(e.error))?;
    sync_dir(parent).map_err(storage)?;
    Ok(())
}

/// Flush a directory entry change (rename) to disk.
pub(crate) fn sync_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}
