//! Running external [commands](Command) and capturing what they report.

use std::{
    io,
    process::{Command, Output, Stdio},
};

/// An error indicating failure while executing some command.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
#[expect(clippy::module_name_repetitions, reason = "this is intended")]
pub enum CommandExecError {
    /// The command could not be started at all.
    #[error("could not run `{command}`: {source}")]
    Spawn {
        /// The command line which was called.
        command: String,
        /// Source of the error.
        source: io::Error,
    },
    /// The command ran but did not exit successfully.
    #[error("`{command}` failed with {}{}", .output.status, captured(.output))]
    ExecFail {
        /// The command line which was called.
        command: String,
        /// The output of the called command.
        output: Output,
    },
}

impl CommandExecError {
    /// Returns the command line which was called.
    #[inline]
    #[must_use]
    pub fn command(&self) -> &str {
        match self {
            Self::Spawn { command, .. } | Self::ExecFail { command, .. } => command,
        }
    }

    /// Returns the output of the command, if it ran at all.
    #[inline]
    #[must_use]
    pub const fn output(&self) -> Option<&Output> {
        match self {
            Self::Spawn { .. } => None,
            Self::ExecFail { output, .. } => Some(output),
        }
    }
}

/// Formats whatever the command wrote to stdout and stderr, each on its own lines.
fn captured(output: &Output) -> String {
    [&output.stdout, &output.stderr]
        .into_iter()
        .map(|stream| String::from_utf8_lossy(stream))
        .filter(|text| !text.trim().is_empty())
        .map(|text| format!("\n{}", text.trim_end()))
        .collect()
}

/// Renders the command line for messages, e.g. `glslc -c shaders/a.vert -o out/avert.spv`.
pub(crate) fn display_command(command: &Command) -> String {
    let mut line = command.get_program().to_string_lossy().into_owned();
    for arg in command.get_args() {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

/// Executes the command with captured stdout and stderr, returning its output
/// if it exits successfully.
pub(crate) fn execute_command(mut command: Command) -> Result<Output, CommandExecError> {
    let line = display_command(&command);
    log::debug!("running `{line}`");
    let output = command
        .stdin(Stdio::null())
        .output()
        .map_err(|source| CommandExecError::Spawn {
            command: line.clone(),
            source,
        })?;
    if !output.status.success() {
        log::debug!("`{line}` exited with {}", output.status);
        return Err(CommandExecError::ExecFail {
            command: line,
            output,
        });
    }
    Ok(output)
}
