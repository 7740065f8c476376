//! Seeding: ahead-of-time computation of subtree artifacts and content.
//!
//! # Architecture
//!
//! - [`SubtreeComputer`] - Presence queries into a [`SubtreeArtifact`](crate::subtree::SubtreeArtifact), plus content
//! - [`SeedingWalker`] - Breadth-first walk of one partial
//! - [`run_seeding`] - Spawns the partials and returns a [`SeedingHandle`]
//!
//! Partials coordinate only through the resource cache: the first partial
//! purges (when asked) and computes each root; the others poll the cache
//! for the root before walking their share of the tree.

mod compute;
mod config;
mod partition;
mod runner;
mod status;
mod walker;

pub use compute::{CachedSubtree, ContentOutcome, SubtreeComputer};
pub use config::{
    SeedingConfig, SeedingTimings, DEFAULT_CONTENT_CONCURRENCY, DEFAULT_MAX_POLL_ATTEMPTS,
    DEFAULT_POLL_INTERVAL, DEFAULT_PURGE_GRACE,
};
pub use partition::{is_owned, owner_of};
pub use runner::run_seeding;
pub use status::{SeedingEvent, SeedingHandle, SeedingStatus, WalkerState, EVENT_BUFFER};
pub use walker::SeedingWalker;
