//! Build cache for shader sources.
//!
//! This library decides which shader sources in a directory have to be handed to the
//! shader compiler again, and remembers when each of them was last compiled successfully.
//!
//! # How it works
//!
//! The cache is a plain text file with one `<name>,<timestamp>` line per shader source.
//! On every run the [`Tracker`](tracker::Tracker) reloads it, lists the source directory
//! and returns every file that is either missing from the cache or was modified strictly
//! after its recorded timestamp. Once the caller has compiled those files, it passes the
//! subset that succeeded back to the tracker, which stamps them with the current time and
//! atomically rewrites the cache file.
//!
//! Files that failed to compile are simply not recorded, so they stay stale and are
//! picked up again on the next run.

pub mod artifact;
pub mod clock;
pub mod lock;
pub mod source_dir;
pub mod store;
pub mod tracker;

#[expect(clippy::pub_use, reason = "part of public API")]
pub use chrono;
