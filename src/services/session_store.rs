// src/services/session_store.rs
use crate::editor::EditorSession;
use crate::errors::PixshopError;
use crate::models::ImageResource;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

pub type SharedSession = Arc<Mutex<EditorSession>>;

/// Live editor sessions. In memory only; nothing survives a restart.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, images: Vec<ImageResource>) -> Result<SharedSession, PixshopError> {
        let id = Uuid::new_v4();
        let mut session = EditorSession::new(id);
        session.load(images)?;
        let shared = Arc::new(Mutex::new(session));

        self.sessions.write().await.insert(id, shared.clone());
        info!("Created session {}", id);
        Ok(shared)
    }

    pub async fn get(&self, id: &Uuid) -> Result<SharedSession, PixshopError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| PixshopError::NotFound(format!("session {}", id)))
    }

    pub async fn remove(&self, id: &Uuid) -> Result<(), PixshopError> {
        let removed = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| PixshopError::NotFound(format!("session {}", id)))?;

        removed.lock().await.close();
        info!("Closed session {}", id);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
