// src/editor/object_urls.rs
use log::debug;
use std::collections::HashMap;
use uuid::Uuid;

/// Revocable display handle for a resource owned elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUrl {
    pub token: Uuid,
    pub url: String,
}

/// Maps live display tokens to the id of the resource they show. Never holds the bytes.
#[derive(Debug)]
pub struct ObjectUrlCache {
    session_id: Uuid,
    live: HashMap<Uuid, Uuid>,
    created: u64,
    released: u64,
}

impl ObjectUrlCache {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            live: HashMap::new(),
            created: 0,
            released: 0,
        }
    }

    pub fn create(&mut self, resource_id: Uuid) -> ObjectUrl {
        let token = Uuid::new_v4();
        self.live.insert(token, resource_id);
        self.created += 1;
        debug!("session {}: created display url {} for {}", self.session_id, token, resource_id);
        ObjectUrl {
            token,
            url: format!("/api/v1/sessions/{}/blobs/{}", self.session_id, token),
        }
    }

    /// Returns false when the handle was already released.
    pub fn release(&mut self, handle: &ObjectUrl) -> bool {
        if self.live.remove(&handle.token).is_some() {
            self.released += 1;
            debug!("session {}: released display url {}", self.session_id, handle.token);
            true
        } else {
            false
        }
    }

    pub fn resolve(&self, token: &Uuid) -> Option<Uuid> {
        self.live.get(token).copied()
    }

    pub fn release_all(&mut self) {
        self.released += self.live.len() as u64;
        self.live.clear();
        debug!(
            "session {}: released all display urls ({} created, {} released)",
            self.session_id, self.created, self.released
        );
    }

    #[cfg(test)]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    #[cfg(test)]
    pub fn created_count(&self) -> u64 {
        self.created
    }

    #[cfg(test)]
    pub fn released_count(&self) -> u64 {
        self.released
    }
}

/// Holds the handle for whichever resource is "current" in one display position.
#[derive(Debug, Default)]
pub struct DisplaySlot {
    shown: Option<(Uuid, ObjectUrl)>,
}

impl DisplaySlot {
    /// Creates a handle only when the shown resource actually changes.
    pub fn show(&mut self, cache: &mut ObjectUrlCache, resource_id: Uuid) -> &ObjectUrl {
        let unchanged = matches!(&self.shown, Some((id, _)) if *id == resource_id);
        if !unchanged {
            self.clear(cache);
        }
        let (_, url) = self
            .shown
            .get_or_insert_with(|| (resource_id, cache.create(resource_id)));
        url
    }

    pub fn clear(&mut self, cache: &mut ObjectUrlCache) {
        if let Some((_, url)) = self.shown.take() {
            cache.release(&url);
        }
    }

    pub fn url(&self) -> Option<&ObjectUrl> {
        self.shown.as_ref().map(|(_, url)| url)
    }
}
