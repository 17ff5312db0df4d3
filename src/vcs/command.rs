use std::{path::Path, process::Command};

use log::trace;

use super::VcsError;

pub(super) struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a VCS client command without a terminal. A non-zero exit is not an error here,
/// callers decide what a failure means.
pub(super) fn run(
    program: &str,
    args: &[&str],
    working_directory: Option<&Path>,
) -> Result<CommandOutput, VcsError> {
    trace!("Running {} {}", program, args.join(" "));

    let mut command = Command::new(program);
    command.args(args);
    if let Some(directory) = working_directory {
        command.current_dir(directory);
    }
    let output = command.output()?;

    Ok(CommandOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Like [`run`], but a non-zero exit is a [`VcsError::Command`].
pub(super) fn run_checked(
    program: &str,
    args: &[&str],
    working_directory: Option<&Path>,
) -> Result<String, VcsError> {
    let output = run(program, args, working_directory)?;
    if output.success {
        Ok(output.stdout)
    } else {
        Err(VcsError::Command {
            command: format!("{} {}", program, args.join(" ")),
            status: "a non-zero exit status".to_owned(),
            stderr: output.stderr.trim().to_owned(),
        })
    }
}
