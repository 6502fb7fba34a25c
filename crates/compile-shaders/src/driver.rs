//! Compiles the shaders that changed since their last successful compilation.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use shader_build_cache::{
    artifact::ArtifactName,
    clock::{Clock, SystemClock},
    tracker::Tracker,
};

use crate::{
    processor::{output_file_name, Processor},
    user_output,
};

/// A shader which compiled successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct CompiledShader {
    /// Name of the shader source.
    pub name: ArtifactName,
    /// Path of the compiled shader.
    pub output: PathBuf,
}

/// A shader which failed to compile.
#[derive(Debug)]
#[non_exhaustive]
pub struct FailedShader<E> {
    /// Name of the shader source.
    pub name: ArtifactName,
    /// What the processor reported.
    pub error: E,
}

/// Outcome of a [`Driver::run`].
#[derive(Debug)]
#[non_exhaustive]
pub struct DriverReport<E> {
    /// Shaders compiled and recorded in the cache.
    pub compiled: Vec<CompiledShader>,
    /// Shaders that failed and stay stale.
    pub failed: Vec<FailedShader<E>>,
}

impl<E> Default for DriverReport<E> {
    #[inline]
    fn default() -> Self {
        Self {
            compiled: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<E> DriverReport<E> {
    /// Returns whether every shader that needed it compiled successfully.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs a [`Processor`] over the stale shaders of a source directory and records
/// the successes with a [`Tracker`].
#[derive(Debug)]
#[non_exhaustive]
pub struct Driver<'tracker, P, C = SystemClock> {
    /// Tracker of the cache file.
    tracker: &'tracker Tracker<C>,
    /// Compiles single shaders.
    processor: P,
    /// Directory of the shader sources.
    source_dir: PathBuf,
    /// Directory the compiled shaders are written to.
    output_dir: PathBuf,
    /// Compile every shader, ignoring the cache.
    force: bool,
}

impl<'tracker, P: Processor, C: Clock> Driver<'tracker, P, C> {
    /// Creates a driver compiling `source_dir` into `output_dir`.
    #[inline]
    pub fn new(
        tracker: &'tracker Tracker<C>,
        processor: P,
        source_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tracker,
            processor,
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
            force: false,
        }
    }

    /// Compiles every shader, not only the stale ones. Successes are still recorded.
    #[inline]
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Returns the shaders this run would compile.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file or the source directory could not be read.
    #[inline]
    pub fn pending(&self) -> anyhow::Result<Vec<ArtifactName>> {
        let pending = if self.force {
            self.tracker.list_all_artifacts(&self.source_dir)?
        } else {
            self.tracker
                .list_artifacts_needing_reprocessing(&self.source_dir)?
        };
        Ok(pending)
    }

    /// Compiles the pending shaders, reporting progress to `writer`, then records
    /// the ones that compiled in the cache file.
    ///
    /// A shader that fails does not stop the others, it is reported and left out
    /// of the cache so it is picked up again next run.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache could not be read or updated, the source directory
    /// could not be listed, the output directory could not be created or writing to
    /// `writer` failed. Failing shaders are not errors, see [`DriverReport::failed`].
    #[inline]
    pub fn run<W: Write>(&self, writer: &mut W) -> anyhow::Result<DriverReport<P::Error>> {
        let pending = self.pending()?;
        let mut report = DriverReport::default();
        if pending.is_empty() {
            user_output!(writer, "All shaders are up to date\n")?;
            return Ok(report);
        }

        user_output!(writer, "Compiling {} shaders\n", pending.len())?;
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "could not create output directory {}",
                self.output_dir.display()
            )
        })?;

        for name in pending {
            let source = self.source_dir.join(name.as_str());
            let output = self.output_dir.join(output_file_name(&name));
            match self.processor.process(&source, &output) {
                Ok(()) => {
                    user_output!(writer, "Compiled {name} to {}\n", output.display())?;
                    report.compiled.push(CompiledShader { name, output });
                }
                Err(error) => {
                    log::debug!("compiling `{name}` failed");
                    user_output!(writer, "Failed to compile {name}: {error}\n")?;
                    report.failed.push(FailedShader { name, error });
                }
            }
        }

        if !report.compiled.is_empty() {
            let compiled = report.compiled.iter().map(|shader| shader.name.clone());
            self.tracker
                .record_successful_processing(compiled)
                .context("could not record compiled shaders")?;
        }
        Ok(report)
    }

    /// Returns the directory the compiled shaders are written to.
    #[inline]
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
