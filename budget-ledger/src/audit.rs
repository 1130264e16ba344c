//! Audit trail for ledger mutations.
//!
//! Every accepted or rejected write is recorded, newest first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use budget_core::{LedgerError, RequestContext};

/// Maximum entries in the audit log before pruning.
const MAX_AUDIT_ENTRIES: usize = 10_000;

/// Which mutation was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    AddNode,
    UpdateNode,
    DeleteNode,
    AddProgressEntry,
    RemoveProgressEntry,
}

/// How the attempt ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditOutcome {
    Accepted,
    Rejected { kind: String, message: String },
}

/// An entry in the audit log.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// Unique entry ID
    pub entry_id: String,
    pub operation: AuditOperation,
    /// Node, item or entry the operation targeted
    pub target_id: Option<String>,
    /// Who acted
    pub actor: String,
    pub outcome: AuditOutcome,
    /// Operation-specific payload
    pub detail: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        ctx: &RequestContext,
        operation: AuditOperation,
        target_id: Option<String>,
        error: Option<&LedgerError>,
        detail: serde_json::Value,
    ) -> Self {
        let outcome = match error {
            None => AuditOutcome::Accepted,
            Some(err) => AuditOutcome::Rejected {
                kind: err.kind().to_string(),
                message: err.to_string(),
            },
        };
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            operation,
            target_id,
            actor: ctx.actor_or_anonymous().to_string(),
            outcome,
            detail,
            recorded_at: Utc::now(),
        }
    }

    pub fn accepted(&self) -> bool {
        matches!(self.outcome, AuditOutcome::Accepted)
    }
}

/// Bounded in-memory audit log.
pub struct AuditLog {
    /// Log entries (newest first)
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    /// Maximum entries to retain
    max_entries: usize,
}

impl AuditLog {
    /// Create a new audit log.
    pub fn new() -> Self {
        Self::with_max_entries(MAX_AUDIT_ENTRIES)
    }

    /// Create with custom max entries.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries,
        }
    }

    /// Append an entry, pruning the oldest beyond the limit.
    pub async fn record(&self, entry: AuditEntry) {
        let mut entries = self.entries.write().await;
        entries.push_front(entry);

        while entries.len() > self.max_entries {
            entries.pop_back();
        }
    }

    /// Most recent entries, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().take(limit).cloned().collect()
    }

    /// Entries touching one target, newest first.
    pub async fn for_target(&self, target_id: &str) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.target_id.as_deref() == Some(target_id))
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Clear all entries.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(target: &str, error: Option<&LedgerError>) -> AuditEntry {
        AuditEntry::new(
            &RequestContext::local().with_actor("clerk"),
            AuditOperation::AddNode,
            Some(target.to_string()),
            error,
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn test_newest_first_and_pruned() {
        let log = AuditLog::with_max_entries(2);
        log.record(entry("a", None)).await;
        log.record(entry("b", None)).await;
        log.record(entry("c", None)).await;

        let recent = log.recent(10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].target_id.as_deref(), Some("c"));
        assert_eq!(recent[1].target_id.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_rejection_recorded() {
        let log = AuditLog::new();
        let err = LedgerError::NotFound("x".to_string());
        log.record(entry("x", Some(&err))).await;

        let found = log.for_target("x").await;
        assert_eq!(found.len(), 1);
        assert!(!found[0].accepted());
        assert_eq!(found[0].actor, "clerk");
        assert!(matches!(
            &found[0].outcome,
            AuditOutcome::Rejected { kind, .. } if kind == "not_found"
        ));
    }
}
