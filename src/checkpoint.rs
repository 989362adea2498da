/// Checkpointed shell commands
///
/// A command wrapped with [`with_checkpoint`] runs at most once to success
/// per working directory: success leaves a marker file behind, and a later run
/// that finds the marker skips the command. Failures propagate their exit code
/// and leave no marker, so a crashed or failed command runs again on resume.
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::logging::{operations, status};
use crate::template::script::shell_quote;

/// Marker state of a checkpointed command
///
/// A crashed run leaves no marker and looks `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    NotStarted,
    Done,
}

impl CheckpointState {
    /// State as seen from the marker file in `dir`
    pub fn from_marker(dir: &Path, marker: &str) -> Self {
        if dir.join(marker).is_file() {
            CheckpointState::Done
        } else {
            CheckpointState::NotStarted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointOutcome {
    /// The marker existed, the command did not run
    Skipped,
    Completed,
    Failed { code: i32 },
}

impl CheckpointOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            CheckpointOutcome::Skipped | CheckpointOutcome::Completed => 0,
            CheckpointOutcome::Failed { code } => *code,
        }
    }
}

/// Wrap a shell command so it is skipped once `marker` exists
///
/// The command is embedded verbatim on its own lines, so heredocs and
/// multi-line strings keep their exact text.
pub fn with_checkpoint(command: &str, marker: &str) -> String {
    let marker = shell_quote(marker);
    format!(
        "if [ -f {marker} ]; then\n  echo \"skip: {marker} exists\"\nelse\n(\n{command}\n) || exit $?\n  touch {marker}\nfi",
        marker = marker,
        command = command.trim_end_matches('\n'),
    )
}

/// Run `command` through bash in `dir`, checkpointed by `marker`
pub fn run_checkpointed(dir: &Path, command: &str, marker: &str) -> Result<CheckpointOutcome> {
    let before = CheckpointState::from_marker(dir, marker);
    if before == CheckpointState::Done {
        info!(
            operation = operations::CHECKPOINT,
            status = status::SKIPPED,
            marker = marker,
            "marker exists, skipping"
        );
    } else {
        debug!(operation = operations::CHECKPOINT, status = status::RUNNING, marker = marker);
    }

    let bash = which::which("bash").unwrap_or_else(|_| PathBuf::from("bash"));
    let exit_status = Command::new(&bash)
        .arg("-c")
        .arg(with_checkpoint(command, marker))
        .current_dir(dir)
        .status()
        .with_context(|| format!("Failed to spawn {}", bash.display()))?;

    let outcome = match (exit_status.success(), before) {
        (true, CheckpointState::Done) => CheckpointOutcome::Skipped,
        (true, _) => CheckpointOutcome::Completed,
        (false, _) => CheckpointOutcome::Failed {
            code: exit_status.code().unwrap_or(-1),
        },
    };

    debug!(operation = operations::CHECKPOINT, outcome = ?outcome, marker = marker);
    Ok(outcome)
}
