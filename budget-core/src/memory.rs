//! In-memory repository, used in tests and for embedding without a database.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::context::RequestContext;
use crate::error::{LedgerError, Result};
use crate::repository::{LedgerRepository, NodeRepository};
use crate::types::{EstimateNode, ProgressEntry};

/// Nodes and entries held in insertion order behind async locks.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    nodes: Arc<RwLock<Vec<EstimateNode>>>,
    entries: Arc<RwLock<Vec<ProgressEntry>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored nodes.
    pub async fn node_count(&self) -> usize {
        self.nodes.read().await.len()
    }

    /// Number of stored entries across all items.
    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl NodeRepository for InMemoryRepository {
    async fn get_node(&self, _ctx: &RequestContext, id: &str) -> Result<Option<EstimateNode>> {
        let nodes = self.nodes.read().await;
        Ok(nodes.iter().find(|n| n.id == id).cloned())
    }

    async fn children(&self, _ctx: &RequestContext, parent_id: &str) -> Result<Vec<EstimateNode>> {
        let nodes = self.nodes.read().await;
        Ok(nodes
            .iter()
            .filter(|n| n.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn roots(&self, _ctx: &RequestContext) -> Result<Vec<EstimateNode>> {
        let nodes = self.nodes.read().await;
        Ok(nodes.iter().filter(|n| n.parent_id.is_none()).cloned().collect())
    }

    async fn insert_node(&self, _ctx: &RequestContext, node: &EstimateNode) -> Result<()> {
        let mut nodes = self.nodes.write().await;
        if nodes.iter().any(|n| n.id == node.id) {
            return Err(LedgerError::Repository(format!("duplicate node id {}", node.id)));
        }
        nodes.push(node.clone());
        Ok(())
    }

    async fn update_node(&self, _ctx: &RequestContext, node: &EstimateNode) -> Result<()> {
        let mut nodes = self.nodes.write().await;
        match nodes.iter_mut().find(|n| n.id == node.id) {
            Some(slot) => {
                *slot = node.clone();
                Ok(())
            }
            None => Err(LedgerError::NotFound(node.id.clone())),
        }
    }

    async fn delete_node(&self, _ctx: &RequestContext, id: &str) -> Result<bool> {
        let mut nodes = self.nodes.write().await;
        let before = nodes.len();
        nodes.retain(|n| n.id != id);
        Ok(nodes.len() != before)
    }
}

#[async_trait]
impl LedgerRepository for InMemoryRepository {
    async fn entries(&self, _ctx: &RequestContext, item_id: &str) -> Result<Vec<ProgressEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.activity_item_id == item_id)
            .cloned()
            .collect())
    }

    async fn get_entry(&self, _ctx: &RequestContext, entry_id: &str) -> Result<Option<ProgressEntry>> {
        let entries = self.entries.read().await;
        Ok(entries.iter().find(|e| e.id == entry_id).cloned())
    }

    async fn insert_entry(&self, _ctx: &RequestContext, entry: &ProgressEntry) -> Result<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn delete_entry(&self, _ctx: &RequestContext, entry_id: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.id != entry_id);
        Ok(entries.len() != before)
    }

    async fn delete_entries_for_item(&self, _ctx: &RequestContext, item_id: &str) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|e| e.activity_item_id != item_id);
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EstimateLevel, NewNode};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_children_and_roots() {
        let repo = InMemoryRepository::new();
        let ctx = RequestContext::local();

        let root = EstimateNode::from_new(NewNode::component("C1", "Roads", Decimal::from(100)));
        let child = EstimateNode::from_new(NewNode::child(
            EstimateLevel::SubComponent,
            root.id.clone(),
            "S1",
            "Paving",
            Decimal::from(40),
        ));
        repo.insert_node(&ctx, &root).await.unwrap();
        repo.insert_node(&ctx, &child).await.unwrap();

        assert_eq!(repo.roots(&ctx).await.unwrap().len(), 1);
        let children = repo.children(&ctx, &root.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, child.id);

        assert!(repo.delete_node(&ctx, &child.id).await.unwrap());
        assert!(!repo.delete_node(&ctx, &child.id).await.unwrap());
        assert!(repo.children(&ctx, &root.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let repo = InMemoryRepository::new();
        let ctx = RequestContext::local();
        let root = EstimateNode::from_new(NewNode::component("C1", "Roads", Decimal::from(100)));

        repo.insert_node(&ctx, &root).await.unwrap();
        assert!(matches!(
            repo.insert_node(&ctx, &root).await,
            Err(LedgerError::Repository(_))
        ));
        assert_eq!(repo.node_count().await, 1);
    }
}
