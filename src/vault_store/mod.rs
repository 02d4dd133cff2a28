//! Vault persistence: project versions, registered assets and per-project
//! source configuration.

mod models;
mod schema;
mod store;

pub use models::{NewVaultAsset, ProjectSource, ProjectVersion, VaultAsset};
pub use schema::VAULT_SCHEMA_SQL;
pub use store::{SqliteVaultStore, VaultStore};
