//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use quadseed::config::ConfigFileError;
use quadseed::error::TilesError;
use quadseed::source::DataSourceError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to load the config file
    ConfigFile(ConfigFileError),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// Failed to load the feature file
    Features(DataSourceError),
    /// Engine error while seeding or serving
    Tiles(TilesError),
    /// Failed to read an input file
    FileRead { path: String, error: std::io::Error },
    /// Failed to write output file
    FileWrite { path: String, error: std::io::Error },
    /// One or more seeding partials ended with an error
    SeedingFailed(usize),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        // Print additional help for specific errors
        match self {
            CliError::Tiles(TilesError::CacheUnavailable(_)) => {
                eprintln!();
                eprintln!("Common issues:");
                eprintln!("  1. Cache directory is not writable: check [cache] directory");
                eprintln!("  2. Disk is full");
            }
            CliError::Tiles(TilesError::InvalidAddress { .. }) => {
                eprintln!();
                eprintln!("Subtree addresses must sit on a multiple of subtree_levels,");
                eprintln!("and x/y must be below 2^level.");
            }
            CliError::ConfigFile(_) => {
                eprintln!();
                eprintln!(
                    "Check the config file: {}",
                    quadseed::config::config_file_path().display()
                );
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "Failed to load configuration: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Features(e) => write!(f, "Failed to load features: {}", e),
            CliError::Tiles(e) => write!(f, "{}", e),
            CliError::FileRead { path, error } => {
                write!(f, "Failed to read file '{}': {}", path, error)
            }
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
            CliError::SeedingFailed(count) => {
                write!(f, "{} seeding partial(s) ended with an error", count)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Features(e) => Some(e),
            CliError::Tiles(e) => Some(e),
            CliError::FileRead { error, .. } => Some(error),
            CliError::FileWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<TilesError> for CliError {
    fn from(e: TilesError) -> Self {
        CliError::Tiles(e)
    }
}
