//! quadseed CLI - Command-line interface
//!
//! This binary provides a command-line interface to the quadseed library.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::lookup::LookupArgs;
use commands::seed::SeedArgs;
use runner::CommonOptions;

#[derive(Parser)]
#[command(name = "quadseed")]
#[command(version = quadseed::VERSION)]
#[command(about = "Seed and serve quadtree subtree availability", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pre-compute and cache every subtree of the configured dataset
    Seed {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of cooperating partials (overrides [seeding] partitions)
        #[arg(long)]
        partitions: Option<u32>,

        /// Run only this partial; all partials run in-process when omitted
        #[arg(long)]
        partition_index: Option<u32>,

        /// Delete the dataset from the cache before seeding
        #[arg(long)]
        purge: bool,

        /// Recompute subtrees even when cached
        #[arg(long)]
        force: bool,
    },

    /// Serve one subtree, computing it if it is not cached
    Subtree {
        #[command(flatten)]
        address: AddressArgs,
    },

    /// Look up one cached content tile
    Content {
        #[command(flatten)]
        address: AddressArgs,
    },

    /// Delete every cached resource of the configured dataset
    Purge {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Decode a subtree file and print its availability summary
    Inspect {
        /// Encoded subtree file
        file: PathBuf,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Options shared by dataset commands.
#[derive(Args)]
struct CommonArgs {
    /// Config file (default: ~/.quadseed/config.ini)
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON file of point features backing the data source
    #[arg(long)]
    features: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl From<CommonArgs> for CommonOptions {
    fn from(args: CommonArgs) -> Self {
        CommonOptions {
            config: args.config,
            features: args.features,
            debug: args.debug,
        }
    }
}

/// Address of one resource.
#[derive(Args)]
struct AddressArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Collection id
    #[arg(long)]
    collection: String,

    /// Quadtree level
    #[arg(long)]
    level: u8,

    /// Column on the level
    #[arg(long)]
    x: u32,

    /// Row on the level
    #[arg(long)]
    y: u32,

    /// Write the raw bytes to this file
    #[arg(long)]
    output: Option<PathBuf>,
}

impl From<AddressArgs> for LookupArgs {
    fn from(args: AddressArgs) -> Self {
        LookupArgs {
            common: args.common.into(),
            collection: args.collection,
            level: args.level,
            x: args.x,
            y: args.y,
            output: args.output,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Seed {
            common,
            partitions,
            partition_index,
            purge,
            force,
        } => commands::seed::run(SeedArgs {
            common: common.into(),
            partitions,
            partition_index,
            purge,
            force,
        }),
        Commands::Subtree { address } => commands::lookup::run_subtree(address.into()),
        Commands::Content { address } => commands::lookup::run_content(address.into()),
        Commands::Purge { common } => commands::purge::run(common.into()),
        Commands::Inspect { file } => commands::inspect::run(&file),
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
