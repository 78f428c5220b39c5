//! Server state shared across handlers.

use log::debug;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::batch::BatchRenderer;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::render::RenderEngine;
use crate::session::{KeyValueStore, Session};

/// Application state shared across handlers.
pub struct AppState {
    pub config: ServerConfig,
    /// The editing session. Handlers only change it through [`AppState::mutate`].
    pub session: RwLock<Session>,
    /// Lazily rendered cards for the current template and records.
    pub batch: BatchRenderer,
    pub store: Arc<dyn KeyValueStore>,
}

impl AppState {
    /// Restore the saved session from `store` and prime the batch renderer.
    pub async fn new(config: ServerConfig, engine: RenderEngine, store: Arc<dyn KeyValueStore>) -> Self {
        let session = Session::restore(store.as_ref()).await;
        let batch = BatchRenderer::new(engine);
        batch
            .set_inputs(session.template().clone(), session.records().to_vec())
            .await;

        Self {
            config,
            session: RwLock::new(session),
            batch,
            store,
        }
    }

    /// Apply a session operation.
    ///
    /// On success the batch cache is replaced with the new inputs and the
    /// session is persisted (best-effort). On failure nothing changes.
    /// Mutations are serialized by the session lock.
    pub async fn mutate<T>(&self, op: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let mut session = self.session.write().await;
        let value = op(&mut *session)?;
        self.batch
            .set_inputs(session.template().clone(), session.records().to_vec())
            .await;
        if session.persist(self.store.as_ref()).await {
            debug!("[server] session saved");
        }
        Ok(value)
    }
}
