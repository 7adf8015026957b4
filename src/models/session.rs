use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a request came from, recorded on audit entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// The authenticated principal a call acts for.
///
/// Every read and write is scoped to `principal_id`; there is no ambient
/// "current user" anywhere in the crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub principal_id: Uuid,
    pub provenance: Provenance,
}

impl Session {
    pub fn new(principal_id: Uuid) -> Self {
        Self {
            principal_id,
            provenance: Provenance::default(),
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Principal id as stored in `user_id` columns.
    pub fn owner(&self) -> String {
        self.principal_id.to_string()
    }
}
