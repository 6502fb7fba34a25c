//! Command line tool compiling shader sources with an external compiler such as `glslc`,
//! skipping every shader that didn't change since it last compiled successfully.
//!
//! ## Compiling shaders
//!
//! `compile-shaders compile` lists the shader sources in the source directory (`shaders/`
//! by default), compiles those that are new or were modified since their last successful
//! compilation into the output directory (`shaders-compiled/`) and records the successes
//! in the cache file (`SHADER_COMPILE_CACHE.txt`). A shader failing to compile is reported
//! but doesn't stop the others, and is tried again on the next run.
//!
//! `compile-shaders status` shows which shaders would be compiled, and
//! `compile-shaders show` shows the cache entries or the effective configuration.
//!
//! ## Configuration
//!
//! Every argument can also be set in a `shader-cache.toml` in the current directory or in
//! the user config file, see the [`config`] module.

#![expect(clippy::pub_use, reason = "part of public API")]

pub use shader_build_cache;

use self::{compile::Compile, show::Show, status::Status};

pub mod command;
pub mod compile;
pub mod config;
pub mod driver;
pub mod processor;
pub mod show;
pub mod status;

/// Central function to write to the user.
///
/// Writes to `$dst` and flushes it, returning the [`std::io::Result`].
#[macro_export]
macro_rules! user_output {
    ($dst: expr, $($args: tt)*) => { {
        #[allow(
            clippy::allow_attributes,
            clippy::useless_attribute,
            unused_imports,
            reason = "`std::io::Write` is only sometimes called??"
        )]
        use std::io::Write as _;

        write!($dst, $($args)*).and_then(|()| $dst.flush())
    } }
}

/// All of the available subcommands for `compile-shaders`
#[derive(clap::Subcommand)]
#[non_exhaustive]
pub enum Command {
    /// Compile the shaders that changed since their last successful compilation.
    Compile(Box<Compile>),

    /// List the shaders that would be compiled.
    Status(Status),

    /// Show some useful values.
    Show(Show),
}

impl Command {
    /// Runs the command
    ///
    /// # Errors
    /// Any errors during execution, usually printed to the user
    #[inline]
    pub fn run(&self) -> anyhow::Result<()> {
        match self {
            Self::Compile(compile) => compile.run()?,
            Self::Status(status) => status.run()?,
            Self::Show(show) => show.run()?,
        }
        Ok(())
    }
}

/// The struct representing the main CLI.
#[derive(clap::Parser)]
#[clap(author, version, about, subcommand_required = true)]
#[non_exhaustive]
pub struct Cli {
    /// The command to run.
    #[clap(subcommand)]
    pub command: Command,
}
