use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::cli::{DemoCommands, SquareSumArgs};
use crate::cli_utils;
use crate::config_discovery::load_config_with_discovery;
use crate::demo::{build_square_sum, expected_total};
use crate::executor::LocalExecutor;
use crate::storage::{FilesystemStore, ObjectStore};
use crate::workflow::{WorkflowBuilder, WorkflowOptions};

pub fn run(command: DemoCommands) -> Result<()> {
    match command {
        DemoCommands::SquareSum(args) => square_sum(args),
    }
}

fn square_sum(args: SquareSumArgs) -> Result<()> {
    let discovered = load_config_with_discovery(args.config.config.as_deref())?;
    let namespace_from_config = discovered.is_some();
    let config = discovered.unwrap_or_default();
    config.validate()?;

    // Flags win over the config file
    let store_dir = args.store_dir.unwrap_or_else(|| config.store_dir());
    let work_dir = args
        .work_dir
        .unwrap_or_else(|| PathBuf::from(&config.executor.work_dir));
    let runner = match &config.executor.runner {
        Some(runner) => PathBuf::from(runner),
        None => std::env::current_exe().context("Failed to locate the galaxy binary")?,
    };
    let namespace = if namespace_from_config {
        config.workflow.namespace.clone()
    } else {
        "square-sum".to_string()
    };

    let store: Arc<dyn ObjectStore> = Arc::new(FilesystemStore::new(&store_dir, config.store.retries));
    let options = WorkflowOptions::new(namespace).with_base_dir(config.workflow.base_dir.clone());
    let mut builder =
        WorkflowBuilder::new("square-sum", store.clone(), options).with_resume(config.resume.clone());
    if let Some(descriptor) = config.dispatcher.descriptor()? {
        builder = builder.with_executor(descriptor);
    }

    let steps = build_square_sum(&mut builder, args.num)?;
    info!(
        num = args.num,
        steps = builder.steps().len(),
        store = %store_dir.display(),
        "square-sum workflow built"
    );

    let executor = LocalExecutor::new(store, work_dir, runner)
        .keep_workdirs(!args.clean && config.executor.keep_workdirs);
    let report = executor.run(builder.steps())?;

    let total = report
        .output_value(steps.fan_in.name(), "total")
        .and_then(|v| v.as_i64())
        .context("fan-in produced no total")?;

    if total != expected_total(args.num) {
        anyhow::bail!(
            "square-sum produced {}, expected {}",
            total,
            expected_total(args.num)
        );
    }

    let shown = report
        .output_value(steps.show.name(), "stdout")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    cli_utils::status(format!("show printed: {}", shown));

    println!("{}", total);
    Ok(())
}

