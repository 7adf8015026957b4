//! Shared state for the API layer.

use std::sync::Arc;

use crate::archive::{CascadeMode, DocumentStorage, PatientArchive};
use crate::db::RecordStore;
use crate::patients::PatientRegistry;
use crate::search::PatientSearch;

/// Shared context for all API routes. Every engine runs over the same store.
#[derive(Clone)]
pub struct ApiContext {
    pub archive: Arc<PatientArchive>,
    pub search: Arc<PatientSearch>,
    pub registry: Arc<PatientRegistry>,
}

impl ApiContext {
    pub fn new(
        store: Arc<dyn RecordStore>,
        mode: CascadeMode,
        documents: Arc<dyn DocumentStorage>,
    ) -> Self {
        Self {
            archive: Arc::new(PatientArchive::new(store.clone(), mode).with_document_storage(documents)),
            search: Arc::new(PatientSearch::new(store.clone())),
            registry: Arc::new(PatientRegistry::new(store)),
        }
    }
}
