//! Purge command - delete every cached resource of the configured dataset.

use crate::error::CliError;
use crate::runner::{CliRunner, CommonOptions};

/// Run the purge command.
pub fn run(common: CommonOptions) -> Result<(), CliError> {
    let runner = CliRunner::new(&common)?;
    runner.log_startup("purge");

    let ctx = runner.dataset_context()?;
    let service = runner.create_service(Default::default())?;

    println!(
        "Purging dataset '{}' from {}",
        ctx.id,
        runner.config().cache.directory.display()
    );
    let removed = runner.runtime().block_on(service.purge(&ctx))?;
    println!("Deleted {} cached resources", removed);
    Ok(())
}
