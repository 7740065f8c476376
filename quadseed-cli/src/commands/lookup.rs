//! Single-resource lookups: serve one subtree or one content tile.

use std::path::PathBuf;

use quadseed::coord::ResourceKind;
use quadseed::subtree::SubtreeArtifact;

use super::inspect::{render, summary};
use crate::error::CliError;
use crate::runner::{CliRunner, CommonOptions};

/// Arguments shared by the subtree and content commands.
pub struct LookupArgs {
    pub common: CommonOptions,
    pub collection: String,
    pub level: u8,
    pub x: u32,
    pub y: u32,
    /// Write the raw bytes here instead of printing a summary
    pub output: Option<PathBuf>,
}

/// Serve one subtree, computing and caching it if needed.
pub fn run_subtree(args: LookupArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(&args.common)?;
    runner.log_startup("subtree");

    let ctx = runner.dataset_context()?;
    let addr = ctx.address(&args.collection, ResourceKind::Subtree, args.level, args.x, args.y)?;
    let source = runner.load_source(args.common.features.as_deref(), &ctx)?;
    let service = runner.create_service(source)?;

    let bytes = runner
        .runtime()
        .block_on(service.get_subtree_bytes(&ctx, &addr))?;
    let Some(bytes) = bytes else {
        println!("Subtree {} could not be computed; see the log for details", addr);
        return Ok(());
    };

    match args.output {
        Some(ref path) => runner.write_output(path, &bytes),
        None => {
            let artifact = SubtreeArtifact::from_bytes(&bytes)?;
            println!("{}", render(&summary(&artifact, bytes.len())));
            Ok(())
        }
    }
}

/// Look up cached content. Content is never computed here.
pub fn run_content(args: LookupArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(&args.common)?;
    runner.log_startup("content");

    let ctx = runner.dataset_context()?;
    let addr = ctx.address(&args.collection, ResourceKind::Content, args.level, args.x, args.y)?;
    let service = runner.create_service(Default::default())?;

    match runner.runtime().block_on(service.get_content(&ctx, &addr))? {
        Some(bytes) => match args.output {
            Some(ref path) => runner.write_output(path, &bytes),
            None => {
                println!("{}: {} bytes", addr, bytes.len());
                Ok(())
            }
        },
        None => {
            println!("{}: not found", addr);
            Ok(())
        }
    }
}
