//! `compile-shaders status`

use std::io::{self, Write};

use shader_build_cache::{clock::Clock, tracker::Tracker};

use crate::{
    config::{CacheArgs, ConfigFileArgs, Settings},
    user_output,
};

/// `status` subcommand
#[derive(clap::Parser, Debug, Clone)]
#[non_exhaustive]
pub struct Status {
    /// Config files to read.
    #[clap(flatten)]
    pub files: ConfigFileArgs,

    /// Cache settings overriding the config files.
    #[clap(flatten)]
    pub cache: CacheArgs,
}

impl Status {
    /// Prints the shaders which need compiling, without compiling them.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the cache or source directory
    /// could not be read.
    #[inline]
    pub fn run(&self) -> anyhow::Result<()> {
        let args = Settings {
            cache: self.cache.clone(),
            ..Settings::default()
        };
        let settings = Settings::resolve(&args, &self.files)?;
        let tracker = settings.cache.tracker();
        print_status(&tracker, &settings.cache, &mut io::stdout())
    }
}

/// Writes the shaders of the source directory that need compiling.
fn print_status<C: Clock, W: Write>(
    tracker: &Tracker<C>,
    cache: &CacheArgs,
    writer: &mut W,
) -> anyhow::Result<()> {
    let stale = tracker.list_artifacts_needing_reprocessing(&cache.source_dir)?;
    if stale.is_empty() {
        user_output!(writer, "All shaders are up to date\n")?;
        return Ok(());
    }

    user_output!(writer, "{} shaders need compiling:\n", stale.len())?;
    for name in stale {
        user_output!(writer, "  {name}\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use shader_cache_test_utils::ShaderDir;

    use super::*;

    fn status(cache: &CacheArgs) -> anyhow::Result<String> {
        let mut out = Vec::new();
        print_status(&cache.tracker(), cache, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    fn cache_args(dir: &ShaderDir) -> CacheArgs {
        CacheArgs {
            source_dir: dir.source_dir(),
            cache_file: dir.cache_file(),
            ..CacheArgs::default()
        }
    }

    #[test_log::test]
    fn lists_stale_shaders() {
        let dir = ShaderDir::new().unwrap();
        dir.write("b.frag", "").unwrap();
        dir.write("a.vert", "").unwrap();

        let out = status(&cache_args(&dir)).unwrap();
        assert_eq!(out, "2 shaders need compiling:\n  a.vert\n  b.frag\n");
        assert!(!dir.cache_file().exists());
    }

    #[test_log::test]
    fn reports_up_to_date() {
        let dir = ShaderDir::new().unwrap();
        dir.write("a.vert", "").unwrap();
        dir.write_cache("a.vert,2999-01-01T00:00:00+00:00\n").unwrap();

        let out = status(&cache_args(&dir)).unwrap();
        assert_eq!(out, "All shaders are up to date\n");
    }

    #[test]
    fn corrupt_cache_is_an_error() {
        let dir = ShaderDir::new().unwrap();
        dir.write_cache("garbage\n").unwrap();
        status(&cache_args(&dir)).unwrap_err();
    }
}
