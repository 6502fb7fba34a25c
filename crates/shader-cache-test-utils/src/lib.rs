//! Utilities for tests of the shader cache crates.

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    time::SystemTime,
};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use tempfile::TempDir;

/// Name of the shader source directory inside a [`ShaderDir`].
const SOURCE_DIR: &str = "shaders";

/// Name of the cache file inside a [`ShaderDir`].
const CACHE_FILE: &str = "SHADER_COMPILE_CACHE.txt";

/// `ShaderDir` sets up a temp dir with a `shaders/` source directory in it, next to which
/// tests can place the cache file and compiled output. Every test gets its own copy, so
/// tests never race on shared files.
///
/// Dropping `ShaderDir` cleans up the dir, except when panic unwinding, so you can debug failures.
#[must_use]
pub struct ShaderDir(TempDir);

impl ShaderDir {
    /// Create a new [`ShaderDir`] with an empty source directory.
    pub fn new() -> anyhow::Result<Self> {
        let root = TempDir::with_prefix("shader-cache-test-")?;
        fs::create_dir(root.path().join(SOURCE_DIR))?;
        Ok(Self(root))
    }

    /// The root of the temp dir.
    pub fn root(&self) -> &Path {
        self.0.path()
    }

    /// The directory holding the shader sources.
    pub fn source_dir(&self) -> PathBuf {
        self.root().join(SOURCE_DIR)
    }

    /// Where tests keep the cache file. It is not created.
    pub fn cache_file(&self) -> PathBuf {
        self.root().join(CACHE_FILE)
    }

    /// Writes a shader source with the given contents and returns its path.
    pub fn write(&self, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
        let path = self.source_dir().join(name);
        fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }

    /// Like [`Self::write`], then sets the modification time of the source to `modified`.
    pub fn write_with_mtime(
        &self,
        name: &str,
        contents: &str,
        modified: DateTime<Utc>,
    ) -> anyhow::Result<PathBuf> {
        let path = self.write(name, contents)?;
        self.set_mtime(name, modified)?;
        Ok(path)
    }

    /// Sets the modification time of an existing shader source.
    pub fn set_mtime(&self, name: &str, modified: DateTime<Utc>) -> anyhow::Result<()> {
        let path = self.source_dir().join(name);
        let file = File::options()
            .write(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        file.set_modified(SystemTime::from(modified))
            .with_context(|| format!("setting mtime of {}", path.display()))?;
        Ok(())
    }

    /// Writes the cache file verbatim.
    pub fn write_cache(&self, contents: &str) -> anyhow::Result<()> {
        fs::write(self.cache_file(), contents)?;
        Ok(())
    }

    /// Reads the cache file verbatim.
    pub fn read_cache(&self) -> anyhow::Result<String> {
        Ok(fs::read_to_string(self.cache_file())?)
    }
}

impl Drop for ShaderDir {
    fn drop(&mut self) {
        // when a test fails, keep directory
        if std::thread::panicking() {
            self.0.disable_cleanup(true);
            eprintln!("keeping test dir {}", self.0.path().display());
        }
    }
}
