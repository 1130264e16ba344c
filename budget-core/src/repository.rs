//! Repository traits the ledger reads from and writes to.
//!
//! Validation never trusts a cached view: every check re-reads the affected
//! child set or entry set through these traits right before deciding. The
//! [`RequestContext`] is handed through so a remote store can authenticate.

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::error::Result;
use crate::types::{EstimateNode, ProgressEntry};

/// Storage for estimate nodes.
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// Fetch a node by id.
    async fn get_node(&self, ctx: &RequestContext, id: &str) -> Result<Option<EstimateNode>>;

    /// All direct children of `parent_id`, in insertion order.
    async fn children(&self, ctx: &RequestContext, parent_id: &str) -> Result<Vec<EstimateNode>>;

    /// All level-1 nodes.
    async fn roots(&self, ctx: &RequestContext) -> Result<Vec<EstimateNode>>;

    /// Store a new node.
    async fn insert_node(&self, ctx: &RequestContext, node: &EstimateNode) -> Result<()>;

    /// Replace a stored node.
    async fn update_node(&self, ctx: &RequestContext, node: &EstimateNode) -> Result<()>;

    /// Remove a node. Returns false when nothing was removed.
    async fn delete_node(&self, ctx: &RequestContext, id: &str) -> Result<bool>;
}

/// Storage for progress entries.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Every entry recorded against an item, oldest first.
    async fn entries(&self, ctx: &RequestContext, item_id: &str) -> Result<Vec<ProgressEntry>>;

    /// Fetch one entry by id.
    async fn get_entry(&self, ctx: &RequestContext, entry_id: &str) -> Result<Option<ProgressEntry>>;

    /// Append an entry.
    async fn insert_entry(&self, ctx: &RequestContext, entry: &ProgressEntry) -> Result<()>;

    /// Remove one entry. Returns false when nothing was removed.
    async fn delete_entry(&self, ctx: &RequestContext, entry_id: &str) -> Result<bool>;

    /// Remove every entry of an item, returning how many were removed.
    async fn delete_entries_for_item(&self, ctx: &RequestContext, item_id: &str) -> Result<usize>;
}
