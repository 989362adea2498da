use anyhow::{Context, Result};
use std::io::Read;
use tracing::debug;

use crate::cli::InvokeArgs;
use crate::handler::runner;
use crate::handler::HandlerRegistry;

pub fn run(args: InvokeArgs) -> Result<()> {
    let payload = match args.payload {
        Some(payload) => payload,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read payload from stdin")?;
            buf
        }
    };

    let registry = HandlerRegistry::with_builtins();
    let outputs = runner::invoke(&registry, payload.trim(), &args.args_file)
        .with_context(|| format!("Failed to invoke handler for {}", args.args_file.display()))?;

    for (name, value) in outputs.iter() {
        debug!(output = %name, value = %value, "handler output");
    }
    Ok(())
}
