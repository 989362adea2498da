use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Galaxy - Step materialization and chunked execution
///
/// Galaxy turns typed work units into relocatable step scripts, runs them
/// locally against a content-addressed store, and provides the chunking and
/// checkpoint helpers used inside remote steps.
#[derive(Parser, Debug)]
#[command(name = "galaxy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Step materialization and chunked execution", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Common configuration arguments shared across commands
#[derive(Parser, Debug, Clone)]
pub struct CommonConfigArgs {
    /// Config file path (defaults to the nearest galaxy.toml)
    #[arg(short = 'c', long, env = "GALAXY_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a handler payload inside a step (second stage)
    Invoke(InvokeArgs),

    /// Print chunk `index` of `n` over the lines of a file or stdin
    Chunk(ChunkArgs),

    /// Run a shell command at most once to success, guarded by a marker file
    Checkpoint(CheckpointArgs),

    /// Built-in demo pipelines
    Demo(DemoArgs),

    /// Configuration management utilities
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct InvokeArgs {
    /// Args JSON written by the entry script
    pub args_file: PathBuf,

    /// Encoded handler payload (read from stdin when omitted)
    #[arg(long)]
    pub payload: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ChunkArgs {
    /// Number of chunks
    #[arg(short = 'n', long)]
    pub n: usize,

    /// Chunk index, 0-based
    #[arg(short = 'i', long)]
    pub index: usize,

    /// Input file (stdin when omitted)
    pub file: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct CheckpointArgs {
    /// Marker file created once the command succeeds
    #[arg(short = 'm', long)]
    pub marker: String,

    /// Directory to run in (defaults to the current directory)
    #[arg(short = 'C', long)]
    pub dir: Option<PathBuf>,

    /// Command to run: one argument is a bash script, several are quoted as argv
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct DemoArgs {
    #[command(subcommand)]
    pub command: DemoCommands,
}

#[derive(Subcommand, Debug)]
pub enum DemoCommands {
    /// Fan out `num` numbers, square each, sum the squares
    SquareSum(SquareSumArgs),
}

#[derive(Parser, Debug)]
pub struct SquareSumArgs {
    /// How many numbers to fan out
    #[arg(long, default_value_t = 5)]
    pub num: i64,

    /// Root of the step working directories
    #[arg(long, env = "GALAXY_WORK_DIR")]
    pub work_dir: Option<PathBuf>,

    /// Filesystem store root
    #[arg(long, env = "GALAXY_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Remove step working directories after the run
    #[arg(long)]
    pub clean: bool,

    #[command(flatten)]
    pub config: CommonConfigArgs,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Validate {
        /// Path to config file
        path: PathBuf,
    },
    /// Generate example config file
    Generate,
    /// Show effective configuration (discovered or defaults)
    Show {
        #[command(flatten)]
        config: CommonConfigArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_checkpoint_trailing_command() {
        let cli = Cli::try_parse_from([
            "galaxy",
            "checkpoint",
            "--marker",
            "train.done",
            "--",
            "echo",
            "-n",
            "hi",
        ])
        .unwrap();
        match cli.command {
            Commands::Checkpoint(args) => {
                assert_eq!(args.marker, "train.done");
                assert_eq!(args.command, vec!["echo", "-n", "hi"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_chunk_args() {
        let cli = Cli::try_parse_from(["galaxy", "chunk", "-n", "3", "-i", "1", "files.txt"]).unwrap();
        match cli.command {
            Commands::Chunk(args) => {
                assert_eq!((args.n, args.index), (3, 1));
                assert_eq!(args.file, Some(PathBuf::from("files.txt")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
