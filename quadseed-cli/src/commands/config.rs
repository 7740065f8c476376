//! Configuration CLI commands.
//!
//! Provides `config list` and `config path` for viewing the effective
//! configuration from the command line.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use quadseed::config::{config_file_path, ConfigFile};
use quadseed::coord::MAX_LEVEL;
use quadseed::dataset::LevelFilter;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// List the effective configuration settings
    List {
        /// Config file to read instead of the default
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::List { config } => {
            let path = config.unwrap_or_else(config_file_path);
            run_list(&path)
        }
        ConfigCommands::Path => run_path(),
    }
}

/// List all configuration settings.
fn run_list(path: &Path) -> Result<(), CliError> {
    let config = ConfigFile::load_from(path)?;

    println!("Configuration Settings ({})", path.display());
    println!("======================");
    println!();
    for line in settings_lines(&config) {
        println!("{}", line);
    }
    Ok(())
}

fn settings_lines(config: &ConfigFile) -> Vec<String> {
    let bbox = &config.dataset.bbox;
    let mut lines = vec![
        "[cache]".to_string(),
        format!("  directory = {}", config.cache.directory.display()),
        String::new(),
        "[dataset]".to_string(),
        format!("  id = {}", config.dataset.id),
        format!(
            "  bbox = {},{},{},{}",
            bbox.min_x, bbox.min_y, bbox.max_x, bbox.max_y
        ),
        String::new(),
        "[tiling]".to_string(),
        format!("  max_level = {}", config.tiling.max_level),
        format!("  subtree_levels = {}", config.tiling.subtree_levels),
        format!(
            "  first_level_with_content = {}",
            config.tiling.first_level_with_content
        ),
        String::new(),
        "[seeding]".to_string(),
        format!("  partitions = {}", config.seeding.partitions),
        format!("  purge = {}", config.seeding.purge),
        format!("  force = {}", config.seeding.force),
        format!("  poll_interval_ms = {}", config.seeding.poll_interval_ms),
        format!("  max_poll_attempts = {}", config.seeding.max_poll_attempts),
        format!("  purge_grace_ms = {}", config.seeding.purge_grace_ms),
        format!(
            "  content_concurrency = {}",
            config.seeding.content_concurrency
        ),
        String::new(),
        "[logging]".to_string(),
        format!("  file = {}", config.logging.file.display()),
    ];

    for collection in &config.collections {
        lines.push(String::new());
        lines.push(format!("[collection.{}]", collection.id));
        lines.extend(filter_lines("tile_filter", &collection.tile_filters));
        lines.extend(filter_lines("content_filter", &collection.content_filters));
    }
    lines
}

fn filter_lines<'a>(key: &'a str, filters: &'a [LevelFilter]) -> impl Iterator<Item = String> + 'a {
    filters.iter().map(move |f| {
        if f.min_level == 0 && f.max_level == MAX_LEVEL {
            format!("  {} = {}", key, f.expression)
        } else {
            format!("  {}.{}-{} = {}", key, f.min_level, f.max_level, f.expression)
        }
    })
}

/// Show the configuration file path.
fn run_path() -> Result<(), CliError> {
    println!("{}", config_file_path().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_lines_include_collections() {
        let config = ConfigFile::parse(
            "[collection.poi]\n\
             tile_filter = category=shop\n\
             content_filter.3-5 = category=cafe\n",
        )
        .unwrap();

        let lines = settings_lines(&config);
        assert!(lines.contains(&"[collection.poi]".to_string()));
        assert!(lines.contains(&"  tile_filter = category=shop".to_string()));
        assert!(lines.contains(&"  content_filter.3-5 = category=cafe".to_string()));
    }

    #[test]
    fn test_list_missing_file_uses_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(run_list(&temp.path().join("missing.ini")).is_ok());
    }
}
