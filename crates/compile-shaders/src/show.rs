//! Display various information about the shader cache, eg its entries.

use std::io::{self, Write};

use shader_build_cache::store::CacheStore;

use crate::{
    config::{ConfigFileArgs, Settings},
    user_output,
};

/// Show the effective configuration or the cache.
#[derive(Clone, Debug, clap::Subcommand)]
#[non_exhaustive]
pub enum Info {
    /// Every shader in the cache with the time it was last compiled successfully.
    Entries,
    /// The configuration after merging defaults, config files and arguments, as TOML.
    Config,
}

/// `show` subcommand
#[derive(Clone, Debug, clap::Parser)]
#[non_exhaustive]
pub struct Show {
    /// Config files to read.
    #[clap(flatten)]
    pub files: ConfigFileArgs,

    /// Settings overriding the config files.
    #[clap(flatten)]
    pub settings: Settings,

    /// Display information about the shader cache.
    #[clap(subcommand)]
    pub command: Info,
}

impl Show {
    /// Entrypoint
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the cache could not be read.
    #[inline]
    pub fn run(&self) -> anyhow::Result<()> {
        let settings = Settings::resolve(&self.settings, &self.files)?;
        log::debug!("showing {:?}", self.command);
        show(&self.command, &settings, &mut io::stdout())
    }
}

/// Writes the requested information.
fn show<W: Write>(info: &Info, settings: &Settings, writer: &mut W) -> anyhow::Result<()> {
    match info {
        Info::Entries => {
            let store = settings.cache.tracker().load()?;
            print_entries(&store, writer)?;
        }
        Info::Config => {
            user_output!(writer, "{}", settings.to_toml()?)?;
        }
    }
    Ok(())
}

/// Writes one `<name> <timestamp>` line per cache entry.
fn print_entries<W: Write>(store: &CacheStore, writer: &mut W) -> io::Result<()> {
    if store.is_empty() {
        return user_output!(writer, "The cache has no entries\n");
    }
    let width = store
        .records()
        .map(|record| record.name.as_str().len())
        .max()
        .unwrap_or_default();
    for record in store.records() {
        user_output!(
            writer,
            "{:width$}  {}\n",
            record.name.as_str(),
            record.last_processed_at.to_rfc3339()
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use shader_cache_test_utils::ShaderDir;

    use super::*;
    use crate::config::CacheArgs;

    fn settings(dir: &ShaderDir) -> Settings {
        Settings {
            cache: CacheArgs {
                source_dir: dir.source_dir(),
                cache_file: dir.cache_file(),
                ..CacheArgs::default()
            },
            ..Settings::default()
        }
    }

    fn show_to_string(info: &Info, settings: &Settings) -> String {
        let mut out = Vec::new();
        show(info, settings, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test_log::test]
    fn entries_are_aligned() {
        let dir = ShaderDir::new().unwrap();
        dir.write_cache(
            "lighting.frag,2024-01-02T00:00:00+00:00\na.vert,2024-01-01T00:00:00+00:00\n",
        )
        .unwrap();
        let out = show_to_string(&Info::Entries, &settings(&dir));
        assert_eq!(
            out,
            "a.vert         2024-01-01T00:00:00+00:00\n\
             lighting.frag  2024-01-02T00:00:00+00:00\n"
        );
    }

    #[test_log::test]
    fn missing_cache_has_no_entries() {
        let dir = ShaderDir::new().unwrap();
        let out = show_to_string(&Info::Entries, &settings(&dir));
        assert_eq!(out, "The cache has no entries\n");
    }

    #[test_log::test]
    fn config_is_toml() {
        let dir = ShaderDir::new().unwrap();
        let out = show_to_string(&Info::Config, &settings(&dir));
        assert!(out.contains("[cache]"), "{out}");
        assert!(out.contains("unreadable-cache = \"empty-if-missing\""), "{out}");
        assert!(out.contains("compiler = \"glslc\""), "{out}");
    }
}
