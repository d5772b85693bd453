//! dud: versioning for data and the pipelines that produce it.
//!
//! Provides `dud init` for project setup, `dud stage gen`/`dud add` for
//! defining and tracking stages, `dud commit`/`dud checkout` for moving data
//! between the workspace and the cache, `dud run` and `dud status` for
//! pipelines, `dud fetch`/`dud push`/`dud pull` for remotes, and `dud graph`
//! for visualizing the stage graph.

#![warn(missing_docs)]

mod checksum;
mod config;
mod init;
mod pipeline;
mod stage;
mod status;

use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// dud, a lightweight tool for versioning data alongside source code.
#[derive(Parser, Debug)]
#[command(name = "dud", version, about = "Version data and build pipelines")]
pub struct Cli {
    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a project in the current directory.
    Init,
    /// Generate stage files or add them to the index.
    Stage {
        /// The stage subcommand to run.
        #[command(subcommand)]
        command: StageCommand,
    },
    /// Add stage files to the index.
    Add(AddArgs),
    /// Save stage outputs to the cache and record their checksums.
    Commit(CheckoutArgs),
    /// Materialize committed stage outputs in the workspace.
    Checkout(CheckoutArgs),
    /// Print the state of stages and their artifacts.
    #[command(visible_aliases = ["stat", "st"])]
    Status(StatusArgs),
    /// Run out-of-date stages.
    Run(StageSelection),
    /// Download missing stage outputs from the remote cache.
    Fetch(StageSelection),
    /// Upload stage outputs to the remote cache.
    Push(StageSelection),
    /// Fetch, then check out stage outputs.
    Pull(CheckoutArgs),
    /// Print the stage graph in Graphviz DOT format.
    Graph(GraphArgs),
    /// Print BLAKE3 checksums of files, or of stdin.
    Checksum(ChecksumArgs),
    /// Read or modify the project config.
    Config {
        /// The config subcommand to run.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Subcommands of `dud stage`.
#[derive(Subcommand, Debug)]
pub enum StageCommand {
    /// Print a new stage definition as YAML.
    Gen(StageGenArgs),
    /// Add stage files to the index.
    Add(AddArgs),
}

/// Subcommands of `dud config`.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective value of a config key.
    Get {
        /// The key to read (`cache` or `remote`).
        key: String,
    },
    /// Set a key in the project config file.
    Set {
        /// The key to write (`cache` or `remote`).
        key: String,
        /// The new value.
        value: String,
    },
}

/// Stage files to operate on, and whether to follow their dependencies.
#[derive(Args, Debug)]
pub struct StageSelection {
    /// Stage files to act on. All stages in the index if omitted.
    pub stages: Vec<String>,

    /// Don't operate recursively on upstream stages.
    #[arg(short, long)]
    pub single_stage: bool,
}

/// Arguments for `dud commit`, `dud checkout` and `dud pull`.
#[derive(Args, Debug)]
pub struct CheckoutArgs {
    /// Materialize files as copies instead of links to the cache.
    #[arg(short, long)]
    pub copy: bool,

    /// Stages to act on.
    #[command(flatten)]
    pub selection: StageSelection,
}

/// Arguments for `dud status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the full status as JSON.
    #[arg(long)]
    pub debug: bool,

    /// Stages to act on.
    #[command(flatten)]
    pub selection: StageSelection,
}

/// Arguments for `dud graph`.
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Only draw stages and the dependencies between them.
    #[arg(long)]
    pub stages_only: bool,

    /// Stage files to graph. All stages in the index if omitted.
    pub stages: Vec<String>,
}

/// Arguments for `dud stage gen`.
#[derive(Args, Debug)]
pub struct StageGenArgs {
    /// An output artifact. May be repeated.
    #[arg(short = 'o', long = "out")]
    pub outputs: Vec<String>,

    /// An input artifact. May be repeated.
    #[arg(short = 'd', long = "dep")]
    pub inputs: Vec<String>,

    /// Directory to run the command in.
    #[arg(short = 'w', long = "work-dir")]
    pub work_dir: Option<String>,

    /// The command and its arguments.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Arguments for `dud add` and `dud stage add`.
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Stage files to add.
    #[arg(required = true)]
    pub stages: Vec<String>,
}

/// Arguments for `dud checksum`.
#[derive(Args, Debug)]
pub struct ChecksumArgs {
    /// Files to checksum. Reads stdin if omitted.
    pub files: Vec<String>,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress informational output.
    pub quiet: bool,
    /// Whether to print debug information.
    pub verbose: bool,
}

impl GlobalArgs {
    /// The log filter used when `RUST_LOG` is unset.
    fn default_filter(&self) -> &'static str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}

fn init_tracing(global: &GlobalArgs) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(global.default_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
    };
    init_tracing(&global);

    let result = match cli.command {
        Command::Init => init::run(&global),
        Command::Stage { ref command } => match command {
            StageCommand::Gen(args) => stage::generate(args),
            StageCommand::Add(args) => stage::add(args),
        },
        Command::Add(ref args) => stage::add(args),
        Command::Commit(ref args) => pipeline::commit(args),
        Command::Checkout(ref args) => pipeline::checkout(args),
        Command::Status(ref args) => status::run(args),
        Command::Run(ref args) => pipeline::run(args),
        Command::Fetch(ref args) => pipeline::fetch(args),
        Command::Push(ref args) => pipeline::push(args),
        Command::Pull(ref args) => pipeline::pull(args),
        Command::Graph(ref args) => pipeline::graph(args),
        Command::Checksum(ref args) => checksum::run(args),
        Command::Config { ref command } => config::run(command),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            process::exit(1);
        }
    }
}
