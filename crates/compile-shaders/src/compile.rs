//! `compile-shaders compile`

use std::io;

use crate::{
    config::{ConfigFileArgs, Settings},
    driver::Driver,
};

/// `compile` subcommand
#[derive(clap::Parser, Debug, Clone)]
#[non_exhaustive]
pub struct Compile {
    /// Config files to read.
    #[clap(flatten)]
    pub files: ConfigFileArgs,

    /// Settings overriding the config files.
    #[clap(flatten)]
    pub settings: Settings,

    /// Compile every shader, even those that are up to date.
    #[clap(long, action)]
    pub force: bool,
}

impl Compile {
    /// Compiles the stale shaders and records the successes.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the cache could not be
    /// read or updated, or if any shader failed to compile.
    #[inline]
    pub fn run(&self) -> anyhow::Result<()> {
        let settings = Settings::resolve(&self.settings, &self.files)?;
        let (source_dir, output_dir) = settings.display_dirs();
        log::info!(
            "compiling shaders from {} to {}",
            source_dir.display(),
            output_dir.display()
        );

        let tracker = settings.cache.tracker();
        let driver = Driver::new(
            &tracker,
            settings.compiler.external_compiler(),
            &settings.cache.source_dir,
            &settings.compiler.output_dir,
        )
        .force(self.force);
        let report = driver.run(&mut io::stdout())?;

        if !report.is_success() {
            anyhow::bail!(
                "{} of {} shaders failed to compile",
                report.failed.len(),
                report.failed.len() + report.compiled.len()
            );
        }
        Ok(())
    }
}
