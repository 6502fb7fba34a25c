//! Exclusive lock guarding updates of a cache file against concurrent writers.
//!
//! The lock is an advisory OS lock on a sibling file named `<cache file>.lock`.
//! The file itself is kept between runs and only holds the id of the last owner,
//! for diagnostics. The OS releases the lock when the [`CacheLock`] is dropped or the
//! owning process dies, so a crashed writer never blocks later updates.

use std::{
    ffi::OsString,
    fs::{self, File},
    io::{self, Write as _},
    path::{Path, PathBuf},
};

use fs4::fs_std::FileExt;

/// Held lock of a cache file, released on drop.
#[derive(Debug)]
#[non_exhaustive]
#[expect(clippy::module_name_repetitions, reason = "this is intended")]
pub struct CacheLock {
    /// Path to the lock file.
    path: PathBuf,
    /// The locked file, the lock lives as long as this handle.
    file: File,
}

impl CacheLock {
    /// Returns the path of the lock file guarding the given cache file.
    #[inline]
    #[must_use]
    pub fn path_for(cache_file: &Path) -> PathBuf {
        let mut file_name = cache_file
            .file_name()
            .map_or_else(OsString::new, ToOwned::to_owned);
        file_name.push(".lock");
        cache_file.with_file_name(file_name)
    }

    /// Acquires the lock of the given cache file without waiting.
    ///
    /// A lock file left behind by a process that died is simply locked again.
    ///
    /// # Errors
    ///
    /// Returns [`AcquireLockError::Held`] if another handle holds the lock,
    /// or [`AcquireLockError::Io`] if the lock file could not be opened or locked.
    #[inline]
    pub fn try_acquire(cache_file: &Path) -> Result<Self, AcquireLockError> {
        let path = Self::path_for(cache_file);
        let io_error = |source| AcquireLockError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        // not truncated before locking, the current owner may be writing its pid
        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_error)?;

        if let Err(error) = FileExt::try_lock_exclusive(&file) {
            if is_contended(&error) {
                log::debug!("cache lock {} is held by someone else", path.display());
                return Err(AcquireLockError::Held { path });
            }
            return Err(io_error(error));
        }
        log::trace!("acquired cache lock {}", path.display());

        // the lock stays valid even if the pid can't be written
        if let Err(error) = file
            .set_len(0)
            .and_then(|()| writeln!(file, "{}", std::process::id()))
        {
            log::debug!("could not write pid into {}: {error}", path.display());
        }

        Ok(Self { path, file })
    }

    /// Returns the path of the held lock file.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    #[inline]
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            log::error!(
                "could not release cache lock {} ({error}), it is released once this process exits",
                self.path.display()
            );
        } else {
            log::trace!("released cache lock {}", self.path.display());
        }
    }
}

/// Returns whether a failed lock attempt failed because someone else holds the lock.
fn is_contended(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs4::lock_contended_error().raw_os_error()
}

/// An error indicating that the cache lock could not be acquired.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AcquireLockError {
    /// Another process holds the lock.
    #[error("cache lock {path} is held by another process")]
    Held {
        /// Path to the lock file.
        path: PathBuf,
    },
    /// The lock file could not be created or locked.
    #[error("could not lock {path}: {source}")]
    Io {
        /// Path to the lock file.
        path: PathBuf,
        /// Source of the error.
        source: io::Error,
    },
}
