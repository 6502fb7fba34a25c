//! Staleness queries and updates of a cache file.

use std::{
    io,
    path::{Path, PathBuf},
};

use crate::{
    artifact::ArtifactName,
    clock::{Clock, SystemClock},
    lock::{AcquireLockError, CacheLock},
    source_dir::{list_source_artifacts, SourceArtifact},
    store::{CacheStore, ReadCacheError},
};

/// What to do when the cache file is missing or cannot be loaded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum UnreadableCachePolicy {
    /// Fail with [`TrackerError::CacheUnreadable`], whether the file is missing or corrupt.
    #[default]
    Fail,
    /// Start with an empty cache if the file does not exist, fail if it is corrupt.
    EmptyIfMissing,
    /// Start with an empty cache if the file is missing or corrupt.
    EmptyIfUnreadable,
}

/// Tracks the last successful processing of every artifact in a cache file.
///
/// Every operation loads the cache file afresh, there is no state kept in between calls.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Tracker<C = SystemClock> {
    /// Path to the cache file.
    cache_file: PathBuf,
    /// Source of the timestamps of successful processing.
    clock: C,
    /// Handling of a missing or corrupt cache file.
    policy: UnreadableCachePolicy,
}

impl Tracker {
    /// Creates a tracker of the given cache file using the system clock.
    #[inline]
    #[must_use]
    pub fn new(cache_file: impl Into<PathBuf>) -> Self {
        Self {
            cache_file: cache_file.into(),
            clock: SystemClock,
            policy: UnreadableCachePolicy::default(),
        }
    }
}

impl<C: Clock> Tracker<C> {
    /// Replaces the clock used to stamp processed artifacts.
    #[inline]
    #[must_use]
    pub fn clock<N: Clock>(self, clock: N) -> Tracker<N> {
        Tracker {
            cache_file: self.cache_file,
            clock,
            policy: self.policy,
        }
    }

    /// Replaces the handling of a missing or corrupt cache file.
    #[inline]
    #[must_use]
    pub fn unreadable_policy(mut self, policy: UnreadableCachePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the path to the cache file.
    #[inline]
    #[must_use]
    pub fn cache_file(&self) -> &Path {
        &self.cache_file
    }

    /// Loads the cache file, applying the [`UnreadableCachePolicy`].
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::CacheUnreadable`] if the policy does not allow to recover.
    #[inline]
    pub fn load(&self) -> Result<CacheStore, TrackerError> {
        let unreadable = |source| TrackerError::CacheUnreadable {
            path: self.cache_file.clone(),
            source,
        };

        match (CacheStore::read(&self.cache_file), self.policy) {
            (Ok(Some(store)), _) => Ok(store),
            (
                Ok(None),
                UnreadableCachePolicy::EmptyIfMissing | UnreadableCachePolicy::EmptyIfUnreadable,
            ) => {
                log::info!(
                    "no cache file at {}, starting with an empty cache",
                    self.cache_file.display()
                );
                Ok(CacheStore::new())
            }
            (Ok(None), UnreadableCachePolicy::Fail) => Err(unreadable(ReadCacheError::Io(
                io::Error::from(io::ErrorKind::NotFound),
            ))),
            (Err(error), UnreadableCachePolicy::EmptyIfUnreadable) => {
                log::warn!(
                    "ignoring unreadable cache file {}: {error}",
                    self.cache_file.display()
                );
                Ok(CacheStore::new())
            }
            (Err(error), _) => Err(unreadable(error)),
        }
    }

    /// Returns the names of all artifacts in `source_dir` that were never processed
    /// or were modified strictly after their last successful processing, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::CacheUnreadable`] if the cache file could not be loaded
    /// and [`TrackerError::SourceDirUnavailable`] if `source_dir` could not be listed.
    #[inline]
    pub fn list_artifacts_needing_reprocessing(
        &self,
        source_dir: &Path,
    ) -> Result<Vec<ArtifactName>, TrackerError> {
        let store = self.load()?;
        let artifacts = Self::list_source(source_dir)?;
        Ok(stale_artifacts(&artifacts, &store))
    }

    /// Returns the names of all artifacts in `source_dir` regardless of their cache state,
    /// sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::SourceDirUnavailable`] if `source_dir` could not be listed.
    #[inline]
    pub fn list_all_artifacts(&self, source_dir: &Path) -> Result<Vec<ArtifactName>, TrackerError> {
        let artifacts = Self::list_source(source_dir)?;
        Ok(artifacts.into_iter().map(|artifact| artifact.name).collect())
    }

    /// Lists `source_dir`, mapping failure to [`TrackerError::SourceDirUnavailable`].
    fn list_source(source_dir: &Path) -> Result<Vec<SourceArtifact>, TrackerError> {
        list_source_artifacts(source_dir).map_err(|source| TrackerError::SourceDirUnavailable {
            path: source_dir.to_path_buf(),
            source,
        })
    }

    /// Stamps the given artifacts with the current time and rewrites the cache file.
    ///
    /// Only pass artifacts that were processed successfully. Entries of other artifacts are
    /// kept unchanged, and no entries are created for artifacts that are not in `names`.
    /// Returns the updated store.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ConcurrentModification`] if another writer is updating the
    /// same cache file, [`TrackerError::CacheUnreadable`] if the current cache file could not
    /// be loaded and [`TrackerError::CachePersistFailure`] if the new one could not be written,
    /// in which case the previous cache file is left intact.
    #[inline]
    pub fn record_successful_processing<I>(&self, names: I) -> Result<CacheStore, TrackerError>
    where
        I: IntoIterator<Item = ArtifactName>,
    {
        let _lock = CacheLock::try_acquire(&self.cache_file)?;
        let mut store = self.load()?;

        let now = self.clock.now();
        let mut recorded = 0_usize;
        for name in names {
            log::trace!("recording `{name}` as processed at {now}");
            store.mark_processed(name, now);
            recorded += 1;
        }

        store
            .persist(&self.cache_file)
            .map_err(|source| TrackerError::CachePersistFailure {
                path: self.cache_file.clone(),
                source,
            })?;
        log::info!(
            "recorded {recorded} processed artifacts in {}",
            self.cache_file.display()
        );
        Ok(store)
    }
}

/// Selects the artifacts that need reprocessing according to `store`.
///
/// An artifact needs reprocessing if it has no entry in `store`,
/// or if it was modified strictly after the time recorded there.
/// The result is sorted by name and free of duplicates.
#[inline]
#[must_use]
pub fn stale_artifacts(artifacts: &[SourceArtifact], store: &CacheStore) -> Vec<ArtifactName> {
    let mut stale: Vec<ArtifactName> = artifacts
        .iter()
        .filter(|artifact| match store.last_processed_at(artifact.name.as_str()) {
            None => {
                log::debug!("`{}` was never processed", artifact.name);
                true
            }
            Some(processed) if artifact.modified > processed => {
                log::debug!(
                    "`{}` was modified at {} after being processed at {processed}",
                    artifact.name,
                    artifact.modified
                );
                true
            }
            Some(_) => false,
        })
        .map(|artifact| artifact.name.clone())
        .collect();
    stale.sort();
    stale.dedup();
    stale
}

/// An error indicating failure of a [`Tracker`] operation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
#[expect(clippy::module_name_repetitions, reason = "this is intended")]
pub enum TrackerError {
    /// The cache file is missing or could not be loaded.
    #[error("cache file {path} is unreadable: {source}")]
    CacheUnreadable {
        /// Path to the cache file.
        path: PathBuf,
        /// Source of the error.
        source: ReadCacheError,
    },
    /// The source directory could not be listed.
    #[error("source directory {path} is unavailable: {source}")]
    SourceDirUnavailable {
        /// Path to the source directory.
        path: PathBuf,
        /// Source of the error.
        source: io::Error,
    },
    /// The updated cache file could not be written. The previous one is left intact.
    #[error("could not write cache file {path}: {source}")]
    CachePersistFailure {
        /// Path to the cache file.
        path: PathBuf,
        /// Source of the error.
        source: io::Error,
    },
    /// Another writer is updating the same cache file; retry once it is done.
    #[error("cache file is being updated concurrently ({lock_path} is locked), retry later")]
    ConcurrentModification {
        /// Path to the lock file held by the other writer.
        lock_path: PathBuf,
    },
    /// The lock guarding the cache file could not be created.
    #[error(transparent)]
    Lock(AcquireLockError),
}

impl From<AcquireLockError> for TrackerError {
    #[inline]
    fn from(error: AcquireLockError) -> Self {
        match error {
            AcquireLockError::Held { path } => Self::ConcurrentModification { lock_path: path },
            other @ AcquireLockError::Io { .. } => Self::Lock(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{DateTime, TimeDelta, TimeZone as _, Utc};
    use shader_cache_test_utils::ShaderDir;

    use super::*;
    use crate::{clock::ManualClock, store::LineError};

    fn jan(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn names(names: &[ArtifactName]) -> Vec<&str> {
        names.iter().map(ArtifactName::as_str).collect()
    }

    fn artifact(name: &str) -> ArtifactName {
        ArtifactName::new(name).unwrap()
    }

    /// The cache contains `foo.vert` processed on Jan 1st, the source dir contains
    /// `foo.vert` modified on Jan 2nd and the uncached `bar.frag`.
    fn scenario_a(shaders: &ShaderDir) {
        shaders
            .write_cache("foo.vert,2024-01-01T00:00:00+00:00\n")
            .unwrap();
        shaders
            .write_with_mtime("foo.vert", "#version 450\nvoid main() {}\n", jan(2))
            .unwrap();
        shaders
            .write_with_mtime("bar.frag", "#version 450\nvoid main() {}\n", jan(2))
            .unwrap();
    }

    #[test_log::test]
    fn new_and_modified_artifacts_need_reprocessing() {
        let shaders = ShaderDir::new().unwrap();
        scenario_a(&shaders);

        let tracker = Tracker::new(shaders.cache_file());
        let stale = tracker
            .list_artifacts_needing_reprocessing(&shaders.source_dir())
            .unwrap();
        assert_eq!(names(&stale), ["bar.frag", "foo.vert"]);
    }

    #[test_log::test]
    fn recorded_artifacts_are_up_to_date() {
        let shaders = ShaderDir::new().unwrap();
        scenario_a(&shaders);
        let clock = ManualClock::new(jan(3));
        let tracker = Tracker::new(shaders.cache_file()).clock(&clock);

        let stale = tracker
            .list_artifacts_needing_reprocessing(&shaders.source_dir())
            .unwrap();
        tracker.record_successful_processing(stale).unwrap();

        let stale = tracker
            .list_artifacts_needing_reprocessing(&shaders.source_dir())
            .unwrap();
        assert!(stale.is_empty(), "{stale:?}");
        assert_eq!(
            shaders.read_cache().unwrap(),
            "bar.frag,2024-01-03T00:00:00.000000000+00:00\n\
             foo.vert,2024-01-03T00:00:00.000000000+00:00\n"
        );
    }

    #[test_log::test]
    fn line_without_separator_is_unreadable() {
        let shaders = ShaderDir::new().unwrap();
        scenario_a(&shaders);
        shaders
            .write_cache("foo.vert,2024-01-01T00:00:00+00:00\nbar.frag\n")
            .unwrap();

        let error = Tracker::new(shaders.cache_file())
            .list_artifacts_needing_reprocessing(&shaders.source_dir())
            .unwrap_err();
        let TrackerError::CacheUnreadable {
            source: ReadCacheError::Parse(parse),
            ..
        } = error
        else {
            panic!("unexpected error {error:?}");
        };
        assert_eq!(parse.line_number, 2);
        assert!(matches!(parse.source, LineError::MissingSeparator));
    }

    #[test]
    fn staleness_is_strict() {
        let processed = jan(10);
        let mut store = CacheStore::new();
        for name in ["earlier.vert", "equal.vert", "later.vert"] {
            store.mark_processed(artifact(name), processed);
        }
        let artifacts = [
            SourceArtifact::new(artifact("earlier.vert"), processed - TimeDelta::seconds(1)),
            SourceArtifact::new(artifact("equal.vert"), processed),
            SourceArtifact::new(artifact("later.vert"), processed + TimeDelta::nanoseconds(1)),
        ];
        assert_eq!(names(&stale_artifacts(&artifacts, &store)), ["later.vert"]);
    }

    #[test]
    fn unseen_artifacts_always_need_reprocessing() {
        let mut store = CacheStore::new();
        store.mark_processed(artifact("other.frag"), jan(1));
        let artifacts = [
            SourceArtifact::new(artifact("b.vert"), jan(1) - TimeDelta::days(365)),
            SourceArtifact::new(artifact("a.vert"), jan(1)),
        ];
        assert_eq!(names(&stale_artifacts(&artifacts, &store)), ["a.vert", "b.vert"]);
    }

    #[test]
    fn deleted_artifacts_are_ignored_but_kept() {
        let shaders = ShaderDir::new().unwrap();
        shaders
            .write_cache("gone.vert,2024-01-01T00:00:00+00:00\n")
            .unwrap();
        shaders.write_with_mtime("new.frag", "", jan(1)).unwrap();
        let tracker = Tracker::new(shaders.cache_file()).clock(ManualClock::new(jan(2)));

        let stale = tracker
            .list_artifacts_needing_reprocessing(&shaders.source_dir())
            .unwrap();
        assert_eq!(names(&stale), ["new.frag"]);

        let store = tracker.record_successful_processing(stale).unwrap();
        assert_eq!(store.last_processed_at("gone.vert"), Some(jan(1)));
        assert_eq!(store.last_processed_at("new.frag"), Some(jan(2)));
    }

    #[test_log::test]
    fn update_leaves_other_entries_alone() {
        let shaders = ShaderDir::new().unwrap();
        shaders
            .write_cache(
                "a.vert,2024-01-01T00:00:00+00:00\n\
                 b.frag,2024-01-01T12:00:00+00:00\n\
                 c.comp,2024-01-02T00:00:00+00:00\n",
            )
            .unwrap();
        let tracker = Tracker::new(shaders.cache_file()).clock(ManualClock::new(jan(5)));

        let store = tracker
            .record_successful_processing([artifact("b.frag")])
            .unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.last_processed_at("a.vert"), Some(jan(1)));
        assert_eq!(store.last_processed_at("b.frag"), Some(jan(5)));
        assert_eq!(store.last_processed_at("c.comp"), Some(jan(2)));
        assert_eq!(tracker.load().unwrap(), store);
    }

    #[test]
    fn repeated_update_only_advances_timestamps() {
        let shaders = ShaderDir::new().unwrap();
        let clock = ManualClock::new(jan(1));
        let tracker = Tracker::new(shaders.cache_file())
            .clock(&clock)
            .unreadable_policy(UnreadableCachePolicy::EmptyIfMissing);

        let first = tracker
            .record_successful_processing([artifact("a.vert")])
            .unwrap();
        clock.advance(TimeDelta::minutes(1));
        let second = tracker
            .record_successful_processing([artifact("a.vert")])
            .unwrap();

        assert_eq!(first.len(), second.len());
        assert_eq!(second.last_processed_at("a.vert"), Some(jan(1) + TimeDelta::minutes(1)));
    }

    #[test]
    fn backwards_clock_keeps_recorded_time() {
        let shaders = ShaderDir::new().unwrap();
        shaders
            .write_cache("a.vert,2024-01-09T00:00:00+00:00\n")
            .unwrap();
        let tracker = Tracker::new(shaders.cache_file()).clock(ManualClock::new(jan(1)));

        let store = tracker
            .record_successful_processing([artifact("a.vert")])
            .unwrap();
        assert_eq!(store.last_processed_at("a.vert"), Some(jan(9)));
    }

    #[test]
    fn missing_cache_fails_by_default() {
        let shaders = ShaderDir::new().unwrap();
        let error = Tracker::new(shaders.cache_file()).load().unwrap_err();
        assert!(matches!(error, TrackerError::CacheUnreadable { .. }));
    }

    #[test]
    fn missing_cache_is_empty_if_allowed() {
        let shaders = ShaderDir::new().unwrap();
        shaders.write("a.vert", "").unwrap();
        let tracker = Tracker::new(shaders.cache_file())
            .unreadable_policy(UnreadableCachePolicy::EmptyIfMissing);

        let stale = tracker
            .list_artifacts_needing_reprocessing(&shaders.source_dir())
            .unwrap();
        assert_eq!(names(&stale), ["a.vert"]);
    }

    #[test]
    fn corrupt_cache_fails_unless_allowed() {
        let shaders = ShaderDir::new().unwrap();
        shaders.write_cache("garbage\n").unwrap();

        let strict = Tracker::new(shaders.cache_file())
            .unreadable_policy(UnreadableCachePolicy::EmptyIfMissing);
        assert!(matches!(
            strict.load().unwrap_err(),
            TrackerError::CacheUnreadable { .. }
        ));

        let lenient = strict.unreadable_policy(UnreadableCachePolicy::EmptyIfUnreadable);
        assert!(lenient.load().unwrap().is_empty());
    }

    #[test]
    fn all_artifacts_ignore_cache_state() {
        let shaders = ShaderDir::new().unwrap();
        shaders.write_cache("garbage\n").unwrap();
        shaders.write_with_mtime("b.vert", "", jan(1)).unwrap();
        shaders.write_with_mtime("a.frag", "", jan(1)).unwrap();

        let all = Tracker::new(shaders.cache_file())
            .list_all_artifacts(&shaders.source_dir())
            .unwrap();
        assert_eq!(names(&all), ["a.frag", "b.vert"]);
    }

    #[test]
    fn missing_source_dir_is_unavailable() {
        let shaders = ShaderDir::new().unwrap();
        shaders.write_cache("").unwrap();
        let error = Tracker::new(shaders.cache_file())
            .list_artifacts_needing_reprocessing(&shaders.root().join("missing"))
            .unwrap_err();
        assert!(matches!(error, TrackerError::SourceDirUnavailable { .. }));
    }

    #[test_log::test]
    fn concurrent_writer_is_detected() {
        let shaders = ShaderDir::new().unwrap();
        shaders
            .write_cache("a.vert,2024-01-01T00:00:00+00:00\n")
            .unwrap();
        let tracker = Tracker::new(shaders.cache_file()).clock(ManualClock::new(jan(2)));

        let other_writer = CacheLock::try_acquire(&shaders.cache_file()).unwrap();
        let error = tracker
            .record_successful_processing([artifact("a.vert")])
            .unwrap_err();
        let TrackerError::ConcurrentModification { lock_path } = error else {
            panic!("unexpected error {error:?}");
        };
        assert_eq!(lock_path, other_writer.path());
        assert_eq!(
            shaders.read_cache().unwrap(),
            "a.vert,2024-01-01T00:00:00+00:00\n"
        );

        drop(other_writer);
        tracker
            .record_successful_processing([artifact("a.vert")])
            .unwrap();
        assert!(shaders.read_cache().unwrap().starts_with("a.vert,2024-01-02T"));
    }

    #[test_log::test]
    fn lock_left_by_crashed_writer_does_not_block_updates() {
        let shaders = ShaderDir::new().unwrap();
        fs::write(CacheLock::path_for(&shaders.cache_file()), "4194304\n").unwrap();
        let clock = ManualClock::new(jan(1));
        let tracker = Tracker::new(shaders.cache_file())
            .unreadable_policy(UnreadableCachePolicy::EmptyIfMissing)
            .clock(&clock);

        for _ in 0..3 {
            clock.advance(TimeDelta::days(1));
            tracker
                .record_successful_processing([artifact("a.vert")])
                .unwrap();
        }
        assert_eq!(
            shaders.read_cache().unwrap(),
            "a.vert,2024-01-04T00:00:00.000000000+00:00\n"
        );
    }

    #[test]
    fn persist_failure_keeps_previous_cache() {
        let shaders = ShaderDir::new().unwrap();
        // a directory squatting on the cache path can be neither read nor replaced
        let cache_file = shaders.cache_file();
        fs::create_dir(&cache_file).unwrap();
        fs::write(cache_file.join("keep"), "kept").unwrap();
        let tracker = Tracker::new(&cache_file)
            .unreadable_policy(UnreadableCachePolicy::EmptyIfUnreadable);

        let error = tracker
            .record_successful_processing([artifact("a.vert")])
            .unwrap_err();
        assert!(
            matches!(error, TrackerError::CachePersistFailure { .. }),
            "{error:?}"
        );
        assert_eq!(fs::read_to_string(cache_file.join("keep")).unwrap(), "kept");
        let _released = CacheLock::try_acquire(&cache_file).unwrap();
    }

    #[test]
    fn uncreatable_lock_is_reported() {
        let shaders = ShaderDir::new().unwrap();
        let blocker = shaders.root().join("blocker");
        fs::write(&blocker, "").unwrap();
        let tracker = Tracker::new(blocker.join("cache.txt"))
            .unreadable_policy(UnreadableCachePolicy::EmptyIfUnreadable);

        let error = tracker
            .record_successful_processing([artifact("a.vert")])
            .unwrap_err();
        assert!(matches!(error, TrackerError::Lock(_)), "{error:?}");
    }
}
