//! # scanlens
//!
//! Data core for reviewing static-analysis scan output:
//! - Streaming ingest of scanner JSON into a SQLite-backed record store
//! - Path tree construction with synthesized directories
//! - Per-subtree aggregate statistics with reviewer-status pruning
//! - A user-editable component overlay, independent of scan records
//! - Merged JSON export (full, or components-only)
//!
//! The UI shell, grid/chart/tree widgets, and the scanner itself are
//! external collaborators: they drive a [`session::Session`] and subscribe
//! to its [`events::EventBus`].

pub mod aggregate;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod export;
pub mod ingest;
pub mod session;
pub mod tree;

pub use error::{Error, Result};
pub use session::Session;
