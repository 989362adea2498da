/// Built-in shell handler
///
/// Runs a bash script with every argument exported as an environment
/// variable of the same name (raw text for strings, JSON otherwise). With
/// `capture` set, trimmed stdout becomes the output value of that name.
///
/// Config: `{"script": "cat \"$result_file\"", "capture": "stdout"}`
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

use super::{StepArgs, StepOutputs};

pub const SHELL_HANDLER: &str = "galaxy.shell";

#[derive(Debug, Deserialize)]
struct ShellConfig {
    script: String,
    #[serde(default)]
    capture: Option<String>,
}

pub fn run_shell(config: &Value, args: &StepArgs) -> Result<StepOutputs> {
    let config: ShellConfig =
        serde_json::from_value(config.clone()).context("Invalid shell handler config")?;

    // Resolve bash from PATH
    let bash = which::which("bash").unwrap_or_else(|_| PathBuf::from("bash"));

    let mut cmd = Command::new(&bash);
    cmd.arg("-c").arg(&config.script);
    for (name, value) in args.iter() {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        cmd.env(name, text);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());

    debug!(script = %config.script, "running shell handler");

    let output = cmd
        .output()
        .with_context(|| format!("Failed to spawn {}", bash.display()))?;

    if !output.status.success() {
        bail!(
            "Script exited with code {}",
            output.status.code().unwrap_or(-1)
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    match config.capture {
        Some(name) => Ok(StepOutputs::new().set(name, stdout.trim_end().to_string())),
        None => {
            std::io::stdout()
                .write_all(stdout.as_bytes())
                .context("Failed to forward script output")?;
            Ok(StepOutputs::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> StepArgs {
        StepArgs::new(value.as_object().unwrap().clone())
    }

    #[test]
    fn test_capture_stdout() {
        let outputs = run_shell(
            &json!({"script": "echo \"$greeting $count\"", "capture": "out"}),
            &args(json!({"greeting": "hello", "count": 3})),
        )
        .unwrap();
        assert_eq!(outputs.get("out"), Some(&json!("hello 3")));
    }

    #[test]
    fn test_failure_propagates() {
        let err = run_shell(&json!({"script": "exit 3"}), &args(json!({}))).unwrap_err();
        assert!(err.to_string().contains("code 3"));
    }

    #[test]
    fn test_invalid_config() {
        assert!(run_shell(&json!({"capture": "x"}), &args(json!({}))).is_err());
    }
}
