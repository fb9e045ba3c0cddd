//! Audit side channel
//!
//! Appends are best-effort with respect to the triggering decision: a
//! storage failure here is reported loudly but never reverses an outcome
//! that has already been decided. The gap in the trail is an operational
//! incident for monitoring to surface, not something to mask.

use sqlx::SqlitePool;

use crate::models::{AuditEntry, NewAuditEntry};

pub(crate) async fn best_effort(pool: &SqlitePool, entry: NewAuditEntry) -> Option<AuditEntry> {
    let action = entry.action;
    let model_id = entry.model_id;
    match AuditEntry::append(pool, entry).await {
        Ok(stored) => Some(stored),
        Err(err) => {
            tracing::error!(
                "AUDIT FAILURE: could not record {} for model {}: {} (decision stands)",
                action.as_str(),
                model_id,
                err
            );
            None
        }
    }
}
