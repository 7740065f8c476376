//! CLI command implementations.
//!
//! Each subcommand has its own module with argument definitions and handlers.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration viewing (list, path)
//! - [`inspect`] - Decode a subtree file
//! - [`lookup`] - Serve one subtree or one content tile
//! - [`purge`] - Delete a dataset from the cache
//! - [`seed`] - Seeding run over the configured dataset

pub mod config;
pub mod inspect;
pub mod lookup;
pub mod purge;
pub mod seed;
