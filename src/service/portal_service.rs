use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::service::portal_controller::{PortalController, PortalDeps};

/// Registry of live portal sessions. Cloned into every request handler.
#[derive(Clone)]
pub struct PortalService {
    deps: PortalDeps,
    sessions: Arc<RwLock<HashMap<Uuid, Arc<PortalController>>>>,
}

impl PortalService {
    pub fn new(deps: PortalDeps) -> Self {
        Self { deps, sessions: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Every session starts locked.
    pub fn create_session(&self) -> Arc<PortalController> {
        let controller = Arc::new(PortalController::new(self.deps.clone()));
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(controller.id(), Arc::clone(&controller));
        info!(session = %controller.id(), active = self.len(), "Created portal session");
        controller
    }

    pub fn get(&self, id: &str) -> Result<Arc<PortalController>, AppError> {
        let not_found = || AppError::SessionNotFound { id: id.to_string() };
        let uuid = Uuid::parse_str(id).map_err(|_| not_found())?;
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&uuid)
            .cloned()
            .ok_or_else(not_found)
    }

    /// Locks the session so any in-flight call is cancelled, then forgets it.
    pub fn end_session(&self, id: &str) -> Result<(), AppError> {
        let controller = self.get(id)?;
        controller.lock();
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&controller.id());
        info!(session = %controller.id(), "Ended portal session");
        Ok(())
    }

    pub fn max_attachment_bytes(&self) -> usize {
        self.deps.encoder.max_bytes()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
