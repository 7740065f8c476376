//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization, runtime creation,
//! and service construction to reduce duplication across command handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quadseed::cache::DiskResourceCache;
use quadseed::config::{config_file_path, ConfigFile};
use quadseed::dataset::DatasetContext;
use quadseed::error::TilesError;
use quadseed::logging::{default_log_file, init_logging, LoggingGuard};
use quadseed::service::TileService;
use quadseed::source::PointFeatureSource;
use tokio::runtime::Runtime;
use tracing::info;

use crate::error::CliError;

/// Options shared by every command that touches the dataset.
#[derive(Debug, Clone, Default)]
pub struct CommonOptions {
    /// Config file; defaults to `~/.quadseed/config.ini`
    pub config: Option<PathBuf>,
    /// Point feature file backing the data source
    pub features: Option<PathBuf>,
    /// Enable debug logging
    pub debug: bool,
}

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    #[allow(dead_code)]
    logging_guard: LoggingGuard,
    /// Loaded configuration file
    config: ConfigFile,
    runtime: Runtime,
}

impl CliRunner {
    /// Create a runner, loading config and initializing logging.
    ///
    /// When stdout is a TTY, stdout logging is disabled so progress output
    /// stays readable; the log file still receives everything.
    pub fn new(options: &CommonOptions) -> Result<Self, CliError> {
        let config_path = options.config.clone().unwrap_or_else(config_file_path);
        let config = ConfigFile::load_from(&config_path)?;

        let log_path = &config.logging.file;
        let log_dir = log_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let log_file = log_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| default_log_file().to_string());

        let stdout_enabled = !atty::is(atty::Stream::Stdout);
        let logging_guard = init_logging(&log_dir, &log_file, stdout_enabled, options.debug)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("quadseed-worker")
            .build()
            .map_err(CliError::Runtime)?;

        Ok(Self {
            logging_guard,
            config,
            runtime,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("quadseed v{}", quadseed::VERSION);
        info!("quadseed CLI: {} command", command);
    }

    /// Dataset context resolved from the config, with its tiling validated.
    pub fn dataset_context(&self) -> Result<DatasetContext, CliError> {
        let ctx = self.config.to_dataset_context();
        ctx.tiling.validate().map_err(CliError::Config)?;
        if ctx.collections.is_empty() {
            return Err(CliError::Config(
                "no collections configured; add a [collection.<id>] section".to_string(),
            ));
        }
        Ok(ctx)
    }

    /// Load the point feature source, or an empty one when no file is given.
    pub fn load_source(
        &self,
        features: Option<&Path>,
        ctx: &DatasetContext,
    ) -> Result<PointFeatureSource, CliError> {
        let source = match features {
            Some(path) => {
                let source = PointFeatureSource::load_from_file(path).map_err(CliError::Features)?;
                info!(path = %path.display(), features = source.len(), "Features loaded");
                source
            }
            None => {
                println!("Warning: no --features file given, every cell will be empty");
                PointFeatureSource::default()
            }
        };
        Ok(source.with_extent(ctx.bounding_box))
    }

    /// Open the disk cache and build a service over it.
    pub fn create_service(&self, source: PointFeatureSource) -> Result<TileService, CliError> {
        let directory = self.config.cache.directory.clone();
        let cache = self
            .runtime
            .block_on(DiskResourceCache::open(directory))
            .map_err(TilesError::from)?;

        Ok(TileService::new(Arc::new(cache), Arc::new(source)))
    }

    /// Write command output to a file.
    pub fn write_output(&self, path: &Path, data: &[u8]) -> Result<(), CliError> {
        std::fs::write(path, data).map_err(|e| CliError::FileWrite {
            path: path.display().to_string(),
            error: e,
        })?;
        info!(path = %path.display(), bytes = data.len(), "Output written");
        println!("✓ Saved {} bytes to {}", data.len(), path.display());
        Ok(())
    }
}
