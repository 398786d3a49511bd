//! Record store and overlay store over SQLite

pub mod components;
pub mod init;
pub mod models;
pub mod records;

pub use components::ComponentStore;
pub use init::{init_database, init_memory_database};
pub use models::*;
pub use records::RecordStore;
