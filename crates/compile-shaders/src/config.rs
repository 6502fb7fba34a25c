//! Manage and merge the various sources of config:
//! built-in defaults, the user config file, the project config file and provided args.
//!
//! Config files are TOML with the same layout as [`Settings`]:
//!
//! ```toml
//! [cache]
//! source-dir = "shaders"
//! cache-file = "SHADER_COMPILE_CACHE.txt"
//! unreadable-cache = "empty-if-missing"
//!
//! [compiler]
//! compiler = "glslc"
//! compiler-args = ["-O"]
//! output-dir = "shaders-compiled"
//! ```
//!
//! Relative paths are resolved against the current directory.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use serde_json::Value;
use shader_build_cache::tracker::{Tracker, UnreadableCachePolicy};

use crate::processor::ExternalCompiler;

/// Name of the project config file looked up in the current directory.
pub const PROJECT_CONFIG_FILE: &str = "shader-cache.toml";

/// Default name of the cache file.
pub const DEFAULT_CACHE_FILE: &str = "SHADER_COMPILE_CACHE.txt";

/// Where the shader sources are and where their cache is kept.
#[derive(Clone, Debug, PartialEq, Eq, clap::Parser, serde::Deserialize, serde::Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
#[non_exhaustive]
pub struct CacheArgs {
    /// Directory containing the shader sources.
    #[clap(long, default_value = "shaders")]
    pub source_dir: PathBuf,

    /// File recording when each shader was last compiled successfully.
    #[clap(long, default_value = DEFAULT_CACHE_FILE)]
    pub cache_file: PathBuf,

    /// What to do if the cache file is missing or corrupt.
    #[clap(long, value_enum, default_value_t = UnreadableCachePolicy::EmptyIfMissing)]
    pub unreadable_cache: UnreadableCachePolicy,
}

impl Default for CacheArgs {
    #[inline]
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("shaders"),
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
            unreadable_cache: UnreadableCachePolicy::EmptyIfMissing,
        }
    }
}

impl CacheArgs {
    /// Creates the [`Tracker`] of the configured cache file.
    #[inline]
    #[must_use]
    pub fn tracker(&self) -> Tracker {
        Tracker::new(&self.cache_file).unreadable_policy(self.unreadable_cache)
    }
}

/// How shaders are compiled.
#[derive(Clone, Debug, PartialEq, Eq, clap::Parser, serde::Deserialize, serde::Serialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
#[non_exhaustive]
pub struct CompilerArgs {
    /// Shader compiler to invoke, called as `<compiler> [args...] -c <source> -o <output>`.
    #[clap(long, default_value = "glslc")]
    pub compiler: PathBuf,

    /// Extra argument passed to the shader compiler, may be repeated.
    #[clap(long = "compiler-arg", allow_hyphen_values = true)]
    pub compiler_args: Vec<String>,

    /// Directory the compiled `.spv` files are written to.
    #[clap(long, default_value = "shaders-compiled")]
    pub output_dir: PathBuf,
}

impl Default for CompilerArgs {
    #[inline]
    fn default() -> Self {
        Self {
            compiler: PathBuf::from("glslc"),
            compiler_args: Vec::new(),
            output_dir: PathBuf::from("shaders-compiled"),
        }
    }
}

impl CompilerArgs {
    /// Creates the configured [`ExternalCompiler`].
    #[inline]
    #[must_use]
    pub fn external_compiler(&self) -> ExternalCompiler {
        ExternalCompiler::new(&self.compiler).args(self.compiler_args.iter().cloned())
    }
}

/// All settings shared by the subcommands, mergeable from several sources.
#[derive(Clone, Debug, Default, PartialEq, Eq, clap::Parser, serde::Deserialize, serde::Serialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct Settings {
    /// The flattened [`CacheArgs`].
    #[clap(flatten)]
    pub cache: CacheArgs,

    /// The flattened [`CompilerArgs`].
    #[clap(flatten)]
    pub compiler: CompilerArgs,
}

/// Which config files to read.
#[derive(Clone, Debug, Default, clap::Parser)]
#[non_exhaustive]
pub struct ConfigFileArgs {
    /// Project config file. Defaults to `shader-cache.toml` in the current directory, if present.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Do not read the user config file.
    #[clap(long, action)]
    pub no_user_config: bool,
}

impl ConfigFileArgs {
    /// Path of the user-wide config file, if the platform has a config directory.
    #[inline]
    #[must_use]
    pub fn user_config_file() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "compile-shaders")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Config files to apply in order, each with whether it must exist.
    fn layers(&self) -> Vec<(PathBuf, bool)> {
        let mut layers = Vec::new();
        if !self.no_user_config {
            if let Some(user) = Self::user_config_file() {
                layers.push((user, false));
            }
        }
        match &self.config {
            Some(project) => layers.push((project.clone(), true)),
            None => layers.push((PathBuf::from(PROJECT_CONFIG_FILE), false)),
        }
        layers
    }
}

impl Settings {
    /// Merges defaults, config files and the provided args, in that order.
    ///
    /// Values from config files override everything before them. Args only override
    /// when they differ from their default, so unset args don't shadow config files.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file could not be read or has an invalid value,
    /// or if an explicitly given config file does not exist.
    #[inline]
    pub fn resolve(args: &Self, files: &ConfigFileArgs) -> anyhow::Result<Self> {
        let defaults = serde_json::to_value(Self::default())?;
        let mut merged = defaults.clone();

        for (path, required) in files.layers() {
            if !required && !path.is_file() {
                log::trace!("no config file at {}", path.display());
                continue;
            }
            let layer = read_config_file(&path)?;
            log::debug!("applying config file {}: {layer}", path.display());
            overlay(&mut merged, layer, None);
        }

        overlay(&mut merged, serde_json::to_value(args)?, Some(&defaults));
        let settings: Self =
            serde_json::from_value(merged).context("invalid configuration value")?;
        log::debug!("resolved settings: {settings:#?}");
        Ok(settings)
    }

    /// Renders self as a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns an error if a value can't be represented in TOML.
    #[inline]
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Returns the configured directories with symlinks and `..` resolved where they exist,
    /// for messages to the user.
    #[inline]
    #[must_use]
    pub fn display_dirs(&self) -> (PathBuf, PathBuf) {
        let canonical = |path: &Path| dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        (
            canonical(&self.cache.source_dir),
            canonical(&self.compiler.output_dir),
        )
    }
}

/// Reads a TOML config file as a JSON value, ready for merging.
fn read_config_file(path: &Path) -> anyhow::Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("could not read config file {}", path.display()))?;
    let value: Value = toml::from_str(&text)
        .with_context(|| format!("could not parse config file {}", path.display()))?;
    Ok(value)
}

/// Recursively writes the leaves of `patch` over `base`.
///
/// With `defaults`, a leaf is only written if it differs from the default at the same place.
fn overlay(base: &mut Value, patch: Value, defaults: Option<&Value>) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                let default = defaults.map(|defaults| defaults.get(&key).unwrap_or(&Value::Null));
                let slot = base.entry(key).or_insert(Value::Null);
                overlay(slot, value, default);
            }
        }
        (base, patch) => {
            let is_default = defaults.is_some_and(|default| patch == *default);
            if !is_default {
                *base = patch;
            }
        }
    }
}
