/// Shared application state passed to axum handlers.
use std::sync::Arc;

use tileboard_core::StoreError;

use crate::config::{Credentials, ServerConfig};
use crate::store::memory::MemoryStore;
use crate::store::rest::RestClient;
use crate::store::PaletteRepo;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// `Err` holds the configuration problem every write endpoint reports.
    pub repo: Result<Arc<PaletteRepo>, String>,
}

impl AppState {
    pub fn new(config: ServerConfig, credentials: &Credentials) -> Self {
        let repo = if credentials.memory_store {
            log::warn!(target: "tileboard.state", "Using the in-memory store; data is lost on exit");
            Ok(Arc::new(PaletteRepo::Memory(MemoryStore::new())))
        } else {
            match credentials.service() {
                Ok((url, key)) => Ok(Arc::new(PaletteRepo::Remote(RestClient::new(
                    url,
                    key,
                    &config.bucket,
                )))),
                Err(e) => {
                    log::warn!(target: "tileboard.state", "Write endpoints disabled: {}", e);
                    Err(e.to_string())
                }
            }
        };
        Self {
            config: Arc::new(config),
            repo,
        }
    }

    pub fn with_repo(config: ServerConfig, repo: PaletteRepo) -> Self {
        Self {
            config: Arc::new(config),
            repo: Ok(Arc::new(repo)),
        }
    }

    pub fn repo(&self) -> Result<Arc<PaletteRepo>, StoreError> {
        self.repo
            .clone()
            .map_err(StoreError::Config)
    }
}
