use anyhow::Result;
use clap::Parser;

use galaxy::cli::{Cli, Commands};
use galaxy::{commands, logging};

fn main() -> Result<()> {
    // Initialize structured logging
    logging::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Invoke(args) => commands::invoke::run(args),
        Commands::Chunk(args) => commands::chunk::run(args),
        Commands::Checkpoint(args) => {
            let code = commands::checkpoint::run(args)?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Demo(args) => commands::demo::run(args.command),
        Commands::Config(args) => commands::config::run(args.command),
    }
}
