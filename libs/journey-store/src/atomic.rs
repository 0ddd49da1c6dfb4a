//! Crash-safe file replacement with a one-step backup.
//!
//! Write: lock → copy the previous version to `<file>.bak` → write a temp
//! sibling → fsync → rename over the target → fsync the directory → unlock.
//! A crash before the rename leaves the original untouched.
//!
//! The temp file is created in the target's own directory; rename atomicity
//! is only guaranteed on the same volume.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::config::SizeGuard;
use crate::error::{Result, StoreError};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Result of a write that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The size guard kept the previous file. Callers report success.
    RejectedSizeGuard { previous: u64, attempted: u64 },
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written)
    }
}

/// Advisory lock held on a `<file>.lock` sibling until dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Poll for the lock until `timeout` elapses.
    pub fn acquire(target: &Path, exclusive: bool, timeout: Duration) -> Result<Self> {
        let lock_path = lock_path(target);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;

        let deadline = Instant::now() + timeout;
        loop {
            let attempt = if exclusive {
                FileExt::try_lock_exclusive(&file)
            } else {
                FileExt::try_lock_shared(&file)
            };
            match attempt {
                Ok(()) => return Ok(Self { file }),
                Err(err) if is_contended(&err) => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::LockTimeout(lock_path));
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// `<file>.lock`
pub fn lock_path(target: &Path) -> PathBuf {
    sibling(target, "lock")
}

/// `<file>.bak`
pub fn backup_path(target: &Path) -> PathBuf {
    sibling(target, "bak")
}

fn sibling(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    target.with_file_name(name)
}

/// One file managed with the atomic write / recovering read protocol.
#[derive(Debug, Clone)]
pub struct AtomicFile {
    path: PathBuf,
    lock_timeout: Duration,
    size_guard: SizeGuard,
}

impl AtomicFile {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration, size_guard: SizeGuard) -> Self {
        Self {
            path: path.into(),
            lock_timeout,
            size_guard,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Replace the file's contents.
    pub fn write(&self, bytes: &[u8]) -> Result<WriteOutcome> {
        let parent = self.parent_dir();
        fs::create_dir_all(&parent)?;
        let _lock = FileLock::acquire(&self.path, true, self.lock_timeout)?;

        if let Ok(meta) = fs::metadata(&self.path) {
            let previous = meta.len();
            let attempted = bytes.len() as u64;
            if self.size_guard.rejects(previous, attempted) {
                tracing::warn!(
                    path = %self.path.display(),
                    previous,
                    attempted,
                    "refusing to replace document with a much smaller one"
                );
                return Ok(WriteOutcome::RejectedSizeGuard {
                    previous,
                    attempted,
                });
            }
            fs::copy(&self.path, backup_path(&self.path))?;
        }

        let mut tmp = NamedTempFile::new_in(&parent)?;
        tmp.write_all(bytes)?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        sync_parent_dir(&self.path)?;
        Ok(WriteOutcome::Written)
    }

    pub fn write_json<T: Serialize>(&self, value: &T) -> Result<WriteOutcome> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write(&bytes)
    }

    /// Read and parse the file, recovering from corruption once.
    ///
    /// Returns `None` when the file is missing, unreadable, or still
    /// unparseable after restoring `<file>.bak`.
    pub fn read_with<T>(&self, parse: impl Fn(&[u8]) -> Result<T>) -> Option<T> {
        self.try_read_with(parse).unwrap_or_else(|err| {
            tracing::warn!(path = %self.path.display(), error = %err, "read failed");
            None
        })
    }

    /// [`Self::read_with`] that keeps I/O and lock failures apart from
    /// absence.
    ///
    /// `Ok(None)` means the file is missing or still corrupt after the one
    /// backup restore. Any failure to reach the bytes is an `Err`.
    pub fn try_read_with<T>(&self, parse: impl Fn(&[u8]) -> Result<T>) -> Result<Option<T>> {
        let Some(bytes) = self.read_bytes()? else {
            return Ok(None);
        };

        match parse(&bytes) {
            Ok(value) => return Ok(Some(value)),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "document is corrupt");
            }
        }

        if !self.restore_backup()? {
            return Ok(None);
        }

        let Some(restored) = self.read_bytes()? else {
            return Ok(None);
        };
        match parse(&restored) {
            Ok(value) => {
                tracing::info!(path = %self.path.display(), "restored document from backup");
                Ok(Some(value))
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "backup is corrupt too");
                Ok(None)
            }
        }
    }

    pub fn try_read_json<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.try_read_with(|bytes| serde_json::from_slice(bytes).map_err(Into::into))
    }

    pub fn read_json<T: DeserializeOwned>(&self) -> Option<T> {
        self.read_with(|bytes| serde_json::from_slice(bytes).map_err(Into::into))
    }

    /// Raw bytes under a shared lock; `None` when the file does not exist.
    pub fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let _lock = FileLock::acquire(&self.path, false, self.lock_timeout)?;
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Put `<file>.bak` back in place. Returns false when there is no backup.
    pub fn restore_backup(&self) -> Result<bool> {
        let backup = backup_path(&self.path);
        if !backup.exists() {
            return Ok(false);
        }
        let _lock = FileLock::acquire(&self.path, true, self.lock_timeout)?;
        let bytes = fs::read(&backup)?;
        let mut tmp = NamedTempFile::new_in(self.parent_dir())?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        sync_parent_dir(&self.path)?;
        Ok(true)
    }

    /// Remove the file and its backup / lock siblings.
    pub fn remove(&self) -> Result<()> {
        for path in [self.path.clone(), backup_path(&self.path), lock_path(&self.path)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

fn sync_parent_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            File::open(parent)?.sync_all()?;
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
