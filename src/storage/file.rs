//! File Store
//!
//! Keeps each key in its own file inside a data directory. Writes go to a
//! temporary file first and are renamed into place, so a crash mid-write
//! leaves the previous value readable.
//!
//! All I/O is blocking `std::fs` and the quota check lists the directory on
//! every write. Meant for a small cache on a fast local disk; async callers
//! run writes on the blocking pool (see `tasks::cleanup`).

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::storage::KeyValueStore;

const FILE_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

// == File Store ==
/// Directory-backed `KeyValueStore` with a byte quota over all stored files.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    quota: usize,
}

impl FileStore {
    // == Constructor ==
    /// Opens (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>, quota: usize) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!("File store opened at {}", dir.display());
        Ok(Self { dir, quota })
    }

    /// Directory holding the stored files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", sanitize_key(key), FILE_EXTENSION))
    }

    /// Bytes used by stored files other than `skip`.
    fn usage_without(&self, skip: &Path) -> Result<usize> {
        let mut total = 0usize;
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path == skip || path.extension().and_then(|e| e.to_str()) != Some(FILE_EXTENSION)
            {
                continue;
            }
            let len = fs::metadata(&path)?.len();
            total = total.saturating_add(usize::try_from(len).unwrap_or(usize::MAX));
        }
        Ok(total)
    }
}

/// Maps a key onto a safe file stem.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl KeyValueStore for FileStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        let needed = self.usage_without(&path)?.saturating_add(value.len());
        if needed > self.quota {
            return Err(CacheError::QuotaExceeded {
                needed,
                quota: self.quota,
            });
        }

        let temp = path.with_extension(TEMP_EXTENSION);
        let written = fs::write(&temp, value).and_then(|()| fs::rename(&temp, &path));
        if let Err(err) = written {
            if let Err(cleanup_err) = fs::remove_file(&temp) {
                if cleanup_err.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", temp.display(), cleanup_err);
                }
            }
            return Err(err.into());
        }
        Ok(())
    }
}
