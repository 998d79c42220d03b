//! Read access to the audit trail.

use crate::storage::Storage;
use gatepass_core::audit::AuditEntry;
use gatepass_core::error::GatePassError;
use gatepass_core::types::GatePassId;
use gatepass_core::{DateTime, Utc};

/// Queries over the append-only audit log.
#[derive(Clone)]
pub struct AuditTrail {
    storage: Storage,
}

impl AuditTrail {
    pub(crate) const fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Every entry for a pass, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails or times out.
    pub async fn by_pass(&self, pass_id: GatePassId) -> Result<Vec<AuditEntry>, GatePassError> {
        self.storage
            .call(self.storage.store().list_audit_by_pass(pass_id))
            .await
    }

    /// Every entry recorded in `[from, to)`, oldest first.
    ///
    /// An empty or inverted range yields no entries.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails or times out.
    pub async fn in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AuditEntry>, GatePassError> {
        if from >= to {
            return Ok(Vec::new());
        }
        self.storage
            .call(self.storage.store().list_audit_in_range(from, to))
            .await
    }
}
