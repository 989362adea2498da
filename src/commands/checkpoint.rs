use anyhow::{Context, Result};

use crate::checkpoint::{run_checkpointed, CheckpointOutcome};
use crate::cli::CheckpointArgs;
use crate::cli_utils;
use crate::template::script::shell_quote;

/// Returns the exit code of the wrapped command
pub fn run(args: CheckpointArgs) -> Result<i32> {
    let dir = match args.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let command = command_line(&args.command);

    let outcome = run_checkpointed(&dir, &command, &args.marker)?;
    if let CheckpointOutcome::Failed { code } = outcome {
        cli_utils::status(format!("command failed with exit code {}, no marker written", code));
    }
    Ok(outcome.exit_code())
}

/// A single argument is a bash script; several are an argv, quoted word by word
fn command_line(words: &[String]) -> String {
    match words {
        [script] => script.clone(),
        _ => words
            .iter()
            .map(|word| shell_quote(word))
            .collect::<Vec<_>>()
            .join(" "),
    }
}
