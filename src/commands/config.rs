use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::cli::{CommonConfigArgs, ConfigCommands};
use crate::config::GalaxyConfig;
use crate::config_discovery::load_config_with_discovery;
use crate::resume::stage_namespace;

pub fn run(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Validate { path } => validate(&path),
        ConfigCommands::Generate => generate(),
        ConfigCommands::Show { config } => show(config),
    }
}

fn validate(path: &Path) -> Result<()> {
    info!("Validating config file: {}", path.display());

    let config = GalaxyConfig::from_file(path)?;
    config.validate()?;

    println!("✓ Configuration file is valid: {}", path.display());
    println!("\nSummary:");
    println!("  - Workflow: {} (namespace: {})", config.workflow.name, config.workflow.namespace);
    println!("  - Base directory: {}", config.workflow.base_dir);
    println!("  - Store: {} ({} attempts)", config.store.dir, config.store.retries);
    match config.dispatcher.descriptor()? {
        Some(descriptor) => println!(
            "  - Dispatcher: {:?} on {}@{}:{}",
            descriptor.context_type, descriptor.username, descriptor.host, descriptor.port
        ),
        None => println!("  - Dispatcher: local only"),
    }

    let completed: Vec<&str> = config.resume.completed().collect();
    if !completed.is_empty() {
        println!("  - Completed stages: {}", completed.join(", "));
        let (iteration, stage) = config.resume.resume_point();
        println!("  - Resumes at: {}", stage_namespace(iteration, stage));
    }

    Ok(())
}

fn generate() -> Result<()> {
    info!("Generating example config");
    println!("{}", GalaxyConfig::example()?);
    Ok(())
}

fn show(args: CommonConfigArgs) -> Result<()> {
    info!("Showing effective configuration");

    let config = load_config_with_discovery(args.config.as_deref())?.unwrap_or_default();

    println!("Effective Configuration:\n");
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}
