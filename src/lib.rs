//! Vault Import Server Library
//!
//! This library exposes the internal modules for testing and for the two
//! binaries (`vault-server` and `vault-watch`).

pub mod api_client;
pub mod config;
pub mod import;
pub mod metadata;
pub mod server;
pub mod sources;
pub mod storage;
pub mod vault_store;
pub mod watcher;

// Re-export commonly used types for convenience
pub use import::{ImportJob, ImportJobStatus, ImportPipeline, SqliteImportJobStore};
pub use server::{run_server, ServerState};
pub use vault_store::{SqliteVaultStore, VaultStore};
