//! The external processor turning a shader source into a compiled shader.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use shader_build_cache::artifact::ArtifactName;

use crate::command::{execute_command, CommandExecError};

/// Compiles a single shader source into an output file.
pub trait Processor {
    /// Error reported for a shader that failed to compile.
    type Error: core::fmt::Display;

    /// Compiles `source` into `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the shader could not be compiled.
    fn process(&self, source: &Path, output: &Path) -> Result<(), Self::Error>;
}

/// Returns the file name of the compiled shader for the given source:
/// the source name with its extension folded into the stem, plus `.spv`.
///
/// `foo.vert` becomes `foovert.spv`, `blur.comp` becomes `blurcomp.spv`
/// and a name without extension just gets `.spv` appended.
///
/// Only the last dot is folded: `blur.h.comp` becomes `blur.hcomp.spv`, not `blurh.spv`,
/// so sources differing only after their second dot never share an output file.
#[inline]
#[must_use]
pub fn output_file_name(name: &ArtifactName) -> String {
    let path = Path::new(name.as_str());
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(extension)) => format!(
            "{}{}.spv",
            stem.to_string_lossy(),
            extension.to_string_lossy()
        ),
        _ => format!("{name}.spv"),
    }
}

/// An external compiler invoked as `<compiler> [args...] -c <source> -o <output>`,
/// which is the interface of `glslc`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ExternalCompiler {
    /// Path or name of the compiler executable.
    pub program: PathBuf,
    /// Extra arguments passed before the source file.
    pub args: Vec<String>,
}

impl ExternalCompiler {
    /// Creates a compiler invoking the given program without extra arguments.
    #[inline]
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Adds extra arguments passed to every invocation.
    #[inline]
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Builds the command compiling `source` into `output`.
    fn command(&self, source: &Path, output: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("-c")
            .arg(source)
            .arg("-o")
            .arg(output);
        command
    }
}

impl Processor for ExternalCompiler {
    type Error = CommandExecError;

    #[inline]
    fn process(&self, source: &Path, output: &Path) -> Result<(), Self::Error> {
        let _output = execute_command(self.command(source, output))?;
        Ok(())
    }
}
