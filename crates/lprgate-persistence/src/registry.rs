//! Active-Store Registry
//!
//! Holds the one store handle every reader and writer goes through. The lock
//! only ever guards a pointer swap or clone; no I/O happens while it is held.

use std::sync::RwLock;
use tracing::info;

use crate::handle::StoreHandle;
use lprgate_core::{Error, Result, StoreMode, StoreSession};

#[derive(Debug, Default)]
pub struct ActiveStore {
    current: RwLock<Option<StoreHandle>>,
}

impl ActiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session bound to whichever store is active right now
    ///
    /// # Errors
    /// - `Error::NotInitialized` before the first [`ActiveStore::set_active`]
    pub fn session(&self) -> Result<StoreSession> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(StoreHandle::session)
            .ok_or(Error::NotInitialized)
    }

    /// Replace the active store; store and mode change together
    pub fn set_active(&self, handle: StoreHandle) {
        let mode = handle.mode();
        let location = handle.location();
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
        info!("Active store is now {} ({})", mode, location);
    }

    /// Mode of the active store, `None` before initialization
    pub fn mode(&self) -> Option<StoreMode> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .map(StoreHandle::mode)
    }

    /// Snapshot of the active handle
    pub fn current(&self) -> Option<StoreHandle> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
