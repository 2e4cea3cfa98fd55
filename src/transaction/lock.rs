// src/transaction/lock.rs

//! Process-level transaction lock
//!
//! An exclusive lock file next to the package database serializes the
//! commit stage against other engine processes. The lock is released when
//! the guard drops; the file itself stays behind.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Guard holding the exclusive transaction lock.
#[derive(Debug)]
pub struct TransactionLock {
    file: File,
    path: PathBuf,
}

impl TransactionLock {
    /// Acquire the lock, failing immediately with `LockHeld` if another
    /// process owns it.
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                let mut holder = String::new();
                file.read_to_string(&mut holder).ok();
                let holder = holder.trim();
                let detail = if holder.is_empty() {
                    path.display().to_string()
                } else {
                    format!("{} (PID {})", path.display(), holder)
                };
                return Err(Error::LockHeld(detail));
            }
            Err(e) => return Err(Error::Io(e)),
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;

        debug!("Acquired transaction lock at {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for TransactionLock {
    fn drop(&mut self) {
        FileExt::unlock(&self.file).ok();
        debug!("Released transaction lock at {}", self.path.display());
    }
}
