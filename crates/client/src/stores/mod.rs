//! Stores for application state.

pub mod state;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub use state::{StateEntry, StateUpdate, StructureStateStore, UpdateOutcome};

/// Store shared between the connection's dispatch loop (the only writer)
/// and any number of readers.
#[derive(Debug, Clone, Default)]
pub struct SharedStore(Arc<RwLock<StructureStateStore>>);

impl SharedStore {
    pub fn new(store: StructureStateStore) -> Self {
        Self(Arc::new(RwLock::new(store)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, StructureStateStore> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, StructureStateStore> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }
}
