//! Seed command - pre-compute and cache the subtrees of the configured dataset.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quadseed::seeding::{SeedingConfig, SeedingEvent, SeedingStatus, WalkerState};

use crate::error::CliError;
use crate::runner::{CliRunner, CommonOptions};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Arguments for the seed command.
pub struct SeedArgs {
    pub common: CommonOptions,
    pub partitions: Option<u32>,
    pub partition_index: Option<u32>,
    pub purge: bool,
    pub force: bool,
}

/// Run the seed command.
pub fn run(args: SeedArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(&args.common)?;
    runner.log_startup("seed");

    let ctx = Arc::new(runner.dataset_context()?);
    let source = runner.load_source(args.common.features.as_deref(), &ctx)?;
    let service = runner.create_service(source)?;
    let config = resolve_config(runner.config().to_seeding_config(), &args);

    println!("quadseed Seeding v{}", quadseed::VERSION);
    println!("======================");
    println!();
    println!("Dataset:     {}", ctx.id);
    println!("Bounds:      {}", ctx.bounding_box);
    println!(
        "Tiling:      max level {}, {} levels per subtree",
        ctx.tiling.max_level, ctx.tiling.subtree_levels
    );
    println!(
        "Collections: {}",
        ctx.collections
            .iter()
            .map(|c| c.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    match config.partition_index {
        Some(index) => println!("Partial:     {} of {}", index, config.partition_count),
        None => println!("Partials:    {}", config.partition_count),
    }
    println!();

    // Set up signal handler for graceful shutdown
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    println!("Press Ctrl+C to stop.");
    println!();

    let runtime = runner.runtime();
    let mut handle = service.run_seeding(Arc::clone(&ctx), config, runtime.handle())?;
    let mut events = handle.take_events();

    let statuses = runtime.block_on(async move {
        let mut cancel_sent = false;
        while !handle.is_complete() {
            tokio::time::sleep(PROGRESS_INTERVAL).await;

            if shutdown.load(Ordering::SeqCst) && !cancel_sent {
                println!();
                println!("Stopping after the current subtree...");
                handle.cancel();
                cancel_sent = true;
            }
            if let Some(rx) = events.as_mut() {
                while let Ok(event) = rx.try_recv() {
                    if let SeedingEvent::Warning { partition, message } = event {
                        println!("\rWarning [partial {}]: {}", partition, message);
                    }
                }
            }
            print_progress(&handle.status(), handle.progress_fraction());
        }
        println!();
        handle.wait().await
    });

    print_summary(&statuses);

    let failed = statuses.iter().filter(|s| s.error.is_some()).count();
    if failed > 0 {
        return Err(CliError::SeedingFailed(failed));
    }
    Ok(())
}

/// Apply command-line overrides on top of the config file settings.
fn resolve_config(mut config: SeedingConfig, args: &SeedArgs) -> SeedingConfig {
    if let Some(partitions) = args.partitions {
        config.partition_count = partitions;
    }
    config.partition_index = args.partition_index;
    config.purge_before_run |= args.purge;
    config.force_recompute |= args.force;
    config
}

fn print_progress(statuses: &[SeedingStatus], fraction: f64) {
    let processed: u64 = statuses.iter().map(|s| s.processed).sum();
    let total: u64 = statuses.iter().map(|s| s.total).sum();
    print!(
        "\r  {:>5.1}%  {} / {} subtrees",
        fraction * 100.0,
        processed,
        total
    );
    let _ = std::io::stdout().flush();
}

fn print_summary(statuses: &[SeedingStatus]) {
    println!("Summary");
    println!("-------");
    for status in statuses {
        let label = match status.state {
            WalkerState::Cancelled => "cancelled",
            _ if status.error.is_some() => "failed",
            _ => "done",
        };
        println!(
            "Partial {}: {} ({} computed, {} cached, {} skipped, {} failed)",
            status.partition,
            label,
            status.computed,
            status.cache_hits,
            status.skipped,
            status.failed
        );
        println!(
            "  Content: {} written, {} existing, {} failed",
            status.content_written, status.content_existing, status.content_failed
        );
        if let Some(ref error) = status.error {
            println!("  Error: {}", error);
        }
    }
}
