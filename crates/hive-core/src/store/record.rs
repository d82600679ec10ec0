//! Crash-tolerant read/modify/write of one named JSON document.
//!
//! Design:
//! - Readers never need the lock: `save` writes a temp file and renames it
//!   into place, so any `load` observes either the old document or the new
//!   one, never a partial write.
//! - Writers serialize on the sibling lock file. `update` is the one
//!   read-modify-write primitive; it holds the lock across load, mutate
//!   and replace.
//! - A missing file is an empty document; an unparseable file is a
//!   `CorruptRecord` surfaced to the operator, never discarded.

use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use super::lock::DocumentLock;
use crate::domain::CoreError;

#[derive(Debug, Clone)]
pub struct RecordStore<T> {
    path: PathBuf,
    lock: DocumentLock,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RecordStore<T>
where
    T: Default + Serialize + DeserializeOwned,
{
    /// Open a store for `<dir>/<name>.json` with `<dir>/<name>.lock` as
    /// its sibling lock.
    pub fn open(dir: &Path, name: &str, lock_timeout: Duration) -> Self {
        Self {
            path: dir.join(format!("{name}.json")),
            lock: DocumentLock::new(dir.join(format!("{name}.lock")), lock_timeout),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot read. Lock-free: the atomic rename in `replace` guarantees
    /// a consistent document.
    pub fn load(&self) -> Result<T, CoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                serde_json::from_str(&contents).map_err(|source| CoreError::CorruptRecord {
                    path: self.path.clone(),
                    source,
                })
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(T::default()),
            Err(err) => Err(CoreError::io(&self.path, err)),
        }
    }

    /// Replace the whole document under the lock.
    pub fn save(&self, document: &T) -> Result<(), CoreError> {
        let _guard = self.lock.acquire()?;
        self.replace(document)
    }

    /// Read-modify-write under one lock acquisition. If `apply` returns an
    /// error nothing is written.
    pub fn update<R>(
        &self,
        apply: impl FnOnce(&mut T) -> Result<R, CoreError>,
    ) -> Result<R, CoreError> {
        let _guard = self.lock.acquire()?;
        let mut document = self.load()?;
        let out = apply(&mut document)?;
        self.replace(&document)?;
        Ok(out)
    }

    fn replace(&self, document: &T) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| CoreError::io(parent, err))?;
        }
        let mut buf = serde_json::to_string_pretty(document)
            .map_err(|err| CoreError::Other(format!("serialize {}: {err}", self.path.display())))?;
        buf.push('\n');

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &buf).map_err(|err| CoreError::io(&tmp_path, err))?;
        fs::rename(&tmp_path, &self.path).map_err(|err| CoreError::io(&self.path, err))?;
        trace!(path = %self.path.display(), bytes = buf.len(), "document replaced");
        Ok(())
    }
}
