//! Persistent resource cache for subtree artifacts and tile content.
//!
//! Maps each [`TileAddress`](crate::coord::TileAddress) to raw bytes. The
//! cache is the only state shared between seeding partials, so every
//! implementation guarantees atomic whole-value writes.

mod disk;
mod memory;
mod path;
mod stats;
mod traits;

pub use disk::DiskResourceCache;
pub use memory::MemoryResourceCache;
pub use path::{dataset_directory, resource_path};
pub use stats::CacheStats;
pub use traits::{read_optional, BoxFuture, CacheError, ResourceCache};
