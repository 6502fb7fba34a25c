//! The cache file: one `<name>,<timestamp>` record per line.
//!
//! ```text
//! bar.frag,2024-01-02T10:11:12.000000000+00:00
//! foo.vert,2024-01-01T00:00:00.000000000+00:00
//! ```
//!
//! Records are written sorted by name, timestamps as RFC 3339 in UTC with nanosecond
//! precision so they reload to the exact same instant. When reading, the space separated
//! form `2025-02-11 20:57:50.104567+00:00` is accepted too, as is any UTC offset.

use std::{
    collections::{btree_map, BTreeMap},
    fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
};

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

use crate::artifact::{ArtifactName, InvalidArtifactNameError, RECORD_SEPARATOR};

/// Last successful processing of a single artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ArtifactRecord {
    /// Name of the artifact.
    pub name: ArtifactName,
    /// When the artifact was last processed successfully.
    pub last_processed_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Creates a record from its parts.
    #[inline]
    #[must_use]
    pub const fn new(name: ArtifactName, last_processed_at: DateTime<Utc>) -> Self {
        Self {
            name,
            last_processed_at,
        }
    }

    /// Parses a single line of the cache file.
    fn parse_line(line: &str) -> Result<Self, LineError> {
        let (name, timestamp) = line
            .split_once(RECORD_SEPARATOR)
            .ok_or(LineError::MissingSeparator)?;
        let name = ArtifactName::new(name.trim())?;
        let last_processed_at = parse_timestamp(timestamp.trim())?;
        Ok(Self::new(name, last_processed_at))
    }
}

/// Parses a timestamp in either RFC 3339 or its space separated variant.
fn parse_timestamp(timestamp: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(timestamp)
        .or_else(|_| DateTime::<FixedOffset>::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S%.f%:z"))
        .map(|timestamp| timestamp.with_timezone(&Utc))
}

/// Every artifact with its last successful processing time, keyed by name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[expect(clippy::module_name_repetitions, reason = "this is intended")]
pub struct CacheStore {
    /// Last processing time of every artifact.
    entries: BTreeMap<ArtifactName, DateTime<Utc>>,
}

impl CacheStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tracked artifacts.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no artifact is tracked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns when the given artifact was last processed, if ever.
    #[inline]
    #[must_use]
    pub fn last_processed_at(&self, name: &str) -> Option<DateTime<Utc>> {
        self.entries.get(name).copied()
    }

    /// Iterates over all records, sorted by name.
    #[inline]
    pub fn records(&self) -> impl Iterator<Item = ArtifactRecord> + '_ {
        self.entries
            .iter()
            .map(|(name, at)| ArtifactRecord::new(name.clone(), *at))
    }

    /// Records that the given artifact was processed successfully at `at`.
    ///
    /// Timestamps never move backwards: if the artifact already has a later
    /// timestamp, it is kept and `false` is returned.
    #[inline]
    pub fn mark_processed(&mut self, name: ArtifactName, at: DateTime<Utc>) -> bool {
        match self.entries.entry(name) {
            btree_map::Entry::Vacant(entry) => {
                entry.insert(at);
                true
            }
            btree_map::Entry::Occupied(mut entry) => {
                if *entry.get() > at {
                    log::warn!(
                        "clock reports {at} for `{}`, which is before its recorded {}; keeping the recorded time",
                        entry.key(),
                        entry.get()
                    );
                    false
                } else {
                    entry.insert(at);
                    true
                }
            }
        }
    }

    /// Parses the contents of a cache file.
    ///
    /// Lines consisting only of whitespace are ignored, any other malformed line fails the whole parse.
    ///
    /// # Errors
    ///
    /// Returns an error pointing at the first line that is not a valid record,
    /// or at a record repeating the name of an earlier one.
    #[inline]
    pub fn parse(text: &str) -> Result<Self, ParseCacheError> {
        let mut entries = BTreeMap::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let line_number = index + 1;
            let record = ArtifactRecord::parse_line(line).map_err(|source| ParseCacheError {
                line_number,
                source,
            })?;
            match entries.entry(record.name) {
                btree_map::Entry::Vacant(entry) => {
                    entry.insert(record.last_processed_at);
                }
                btree_map::Entry::Occupied(entry) => {
                    return Err(ParseCacheError {
                        line_number,
                        source: LineError::Duplicate(entry.key().clone()),
                    });
                }
            }
        }
        Ok(Self { entries })
    }

    /// Serializes self into the cache file format.
    #[inline]
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for (name, at) in &self.entries {
            text.push_str(name.as_str());
            text.push(RECORD_SEPARATOR);
            text.push_str(&at.to_rfc3339_opts(SecondsFormat::Nanos, false));
            text.push('\n');
        }
        text
    }

    /// Reads the cache file at the given path.
    ///
    /// Returns [`None`] if there is no file at that path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but could not be read or parsed.
    #[inline]
    pub fn read(path: &Path) -> Result<Option<Self>, ReadCacheError> {
        log::debug!("reading cache file {}", path.display());
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(ReadCacheError::Io(error)),
        };
        let store = Self::parse(&text)?;
        log::debug!("loaded {} cache entries", store.len());
        Ok(Some(store))
    }

    /// Replaces the cache file at the given path with the contents of self.
    ///
    /// The new contents are written to a temporary file next to the target, flushed to disk
    /// and renamed over the target, so the target either keeps its old contents or gets
    /// the complete new ones.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The temporary file is removed in that case.
    #[inline]
    pub fn persist(&self, path: &Path) -> io::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut file = tempfile::Builder::new()
            .prefix(".shader-cache-")
            .suffix(".tmp")
            .tempfile_in(&dir)?;
        log::trace!("writing cache to temporary file {}", file.path().display());
        file.write_all(self.to_text().as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|error| error.error)?;
        sync_dir(&dir)?;

        log::debug!("wrote {} cache entries to {}", self.len(), path.display());
        Ok(())
    }
}

/// Flushes the directory entry of a file renamed into `dir`, so the rename survives a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

/// Directories can't be synced through a file handle here.
#[cfg(not(unix))]
#[expect(clippy::unnecessary_wraps, reason = "same signature on every platform")]
const fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

impl FromIterator<ArtifactRecord> for CacheStore {
    #[inline]
    fn from_iter<T: IntoIterator<Item = ArtifactRecord>>(iter: T) -> Self {
        let mut store = Self::new();
        for record in iter {
            store.mark_processed(record.name, record.last_processed_at);
        }
        store
    }
}

/// An error indicating that the cache file contents are malformed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("line {line_number}: {source}")]
pub struct ParseCacheError {
    /// 1-based number of the offending line.
    pub line_number: usize,
    /// What is wrong with the line.
    #[source]
    pub source: LineError,
}

/// Problem with a single line of the cache file.
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum LineError {
    /// The line has no `,` between name and timestamp.
    #[error("missing `{RECORD_SEPARATOR}` between name and timestamp")]
    MissingSeparator,
    /// The name part is not a valid artifact name.
    #[error(transparent)]
    InvalidName(#[from] InvalidArtifactNameError),
    /// The timestamp part could not be parsed.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),
    /// The name was already recorded on an earlier line.
    #[error("duplicate entry for `{0}`")]
    Duplicate(ArtifactName),
}

/// An error indicating that an existing cache file could not be loaded.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ReadCacheError {
    /// The file could not be read.
    #[error("could not read the cache file: {0}")]
    Io(#[source] io::Error),
    /// The file contents are malformed.
    #[error("malformed cache file, {0}")]
    Parse(#[from] ParseCacheError),
}
