use axum::extract::FromRef;
use std::sync::Arc;

use super::ServerConfig;
use crate::import::{ImportJobStore, ImportService};
use crate::storage::{LocalObjectStorage, UploadSigner};
use crate::vault_store::VaultStore;

pub type GuardedVaultStore = Arc<dyn VaultStore>;
pub type GuardedImportJobStore = Arc<dyn ImportJobStore>;
pub type GuardedObjectStorage = Arc<LocalObjectStorage>;
pub type GuardedUploadSigner = Arc<UploadSigner>;
pub type GuardedImportService = Arc<ImportService>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub vault_store: GuardedVaultStore,
    pub job_store: GuardedImportJobStore,
    pub storage: GuardedObjectStorage,
    pub signer: GuardedUploadSigner,
    pub import_service: GuardedImportService,
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedVaultStore {
    fn from_ref(input: &ServerState) -> Self {
        input.vault_store.clone()
    }
}

impl FromRef<ServerState> for GuardedImportJobStore {
    fn from_ref(input: &ServerState) -> Self {
        input.job_store.clone()
    }
}

impl FromRef<ServerState> for GuardedObjectStorage {
    fn from_ref(input: &ServerState) -> Self {
        input.storage.clone()
    }
}

impl FromRef<ServerState> for GuardedUploadSigner {
    fn from_ref(input: &ServerState) -> Self {
        input.signer.clone()
    }
}

impl FromRef<ServerState> for GuardedImportService {
    fn from_ref(input: &ServerState) -> Self {
        input.import_service.clone()
    }
}
