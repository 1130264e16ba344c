//! SQLite persistence for the budget ledger
//!
//! Implements the [`NodeRepository`] and [`LedgerRepository`] seams from
//! `budget-core` on top of a single SQLite connection.
//!
//! ## Tables
//!
//! - `estimate_nodes` - every level 1-5 node, amounts stored as decimal text
//! - `progress_entries` - progress entries of level-5 items
//! - `schema_version` - migration bookkeeping

pub mod entries;
pub mod error;
pub mod nodes;
pub mod schema;

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use budget_core::{
    EstimateNode, LedgerRepository, NodeRepository, ProgressEntry, RequestContext,
    Result as LedgerResult,
};

pub use error::StoreError;

/// SQLite-backed repository for nodes and entries
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open or create the ledger database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        info!("Opening SQLite database at {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;

        // WAL for concurrent readers
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.with_conn(schema::init_schema)
    }

    /// Run `f` with exclusive access to the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, StoreError> {
        self.with_conn(|conn| {
            let by_level = nodes::count_by_level(conn)?;
            let entry_count = entries::count_entries(conn)?;
            Ok(DbStats {
                node_count: by_level.iter().map(|(_, n)| n).sum(),
                nodes_by_level: by_level,
                entry_count,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub node_count: u64,
    pub nodes_by_level: Vec<(u8, u64)>,
    pub entry_count: u64,
}

#[async_trait]
impl NodeRepository for SqliteRepository {
    async fn get_node(&self, _ctx: &RequestContext, id: &str) -> LedgerResult<Option<EstimateNode>> {
        Ok(self.with_conn(|conn| nodes::get_node(conn, id))?)
    }

    async fn children(&self, _ctx: &RequestContext, parent_id: &str) -> LedgerResult<Vec<EstimateNode>> {
        Ok(self.with_conn(|conn| nodes::list_children(conn, parent_id))?)
    }

    async fn roots(&self, _ctx: &RequestContext) -> LedgerResult<Vec<EstimateNode>> {
        Ok(self.with_conn(nodes::list_roots)?)
    }

    async fn insert_node(&self, _ctx: &RequestContext, node: &EstimateNode) -> LedgerResult<()> {
        Ok(self.with_conn(|conn| nodes::insert_node(conn, node))?)
    }

    async fn update_node(&self, _ctx: &RequestContext, node: &EstimateNode) -> LedgerResult<()> {
        if self.with_conn(|conn| nodes::update_node(conn, node))? {
            Ok(())
        } else {
            Err(budget_core::LedgerError::NotFound(node.id.clone()))
        }
    }

    async fn delete_node(&self, _ctx: &RequestContext, id: &str) -> LedgerResult<bool> {
        Ok(self.with_conn(|conn| nodes::delete_node(conn, id))?)
    }
}

#[async_trait]
impl LedgerRepository for SqliteRepository {
    async fn entries(&self, _ctx: &RequestContext, item_id: &str) -> LedgerResult<Vec<ProgressEntry>> {
        Ok(self.with_conn(|conn| entries::list_entries(conn, item_id))?)
    }

    async fn get_entry(&self, _ctx: &RequestContext, entry_id: &str) -> LedgerResult<Option<ProgressEntry>> {
        Ok(self.with_conn(|conn| entries::get_entry(conn, entry_id))?)
    }

    async fn insert_entry(&self, _ctx: &RequestContext, entry: &ProgressEntry) -> LedgerResult<()> {
        Ok(self.with_conn(|conn| entries::insert_entry(conn, entry))?)
    }

    async fn delete_entry(&self, _ctx: &RequestContext, entry_id: &str) -> LedgerResult<bool> {
        Ok(self.with_conn(|conn| entries::delete_entry(conn, entry_id))?)
    }

    async fn delete_entries_for_item(&self, _ctx: &RequestContext, item_id: &str) -> LedgerResult<usize> {
        Ok(self.with_conn(|conn| entries::delete_entries_for_item(conn, item_id))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use budget_core::{EstimateLevel, ItemDetails, NewNode, NewProgressEntry};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn item_under(parent: &EstimateNode) -> EstimateNode {
        EstimateNode::from_new(
            NewNode::child(EstimateLevel::Item, parent.id.clone(), "I-1", "Cement", dec("1250.75"))
                .with_details(ItemDetails {
                    unit: Some("bag".to_string()),
                    parameter: Some("50kg".to_string()),
                    institute: Some("Works Dept".to_string()),
                }),
        )
    }

    #[tokio::test]
    async fn test_node_roundtrip_preserves_decimals_and_details() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let ctx = RequestContext::local();

        let root = EstimateNode::from_new(NewNode::component("C-1", "Works", dec("10000.10")));
        let item = item_under(&root);
        repo.insert_node(&ctx, &root).await.unwrap();
        repo.insert_node(&ctx, &item).await.unwrap();

        let loaded = repo.get_node(&ctx, &item.id).await.unwrap().unwrap();
        assert_eq!(loaded.estimated_amount, dec("1250.75"));
        assert_eq!(loaded.level, EstimateLevel::Item);
        assert_eq!(loaded.details.unwrap().unit.as_deref(), Some("bag"));

        let roots = repo.roots(&ctx).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert!(roots[0].details.is_none());

        let children = repo.children(&ctx, &root.id).await.unwrap();
        assert_eq!(children.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_node_is_not_found() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let ctx = RequestContext::local();
        let ghost = EstimateNode::from_new(NewNode::component("C-9", "Ghost", dec("1")));

        assert!(matches!(
            repo.update_node(&ctx, &ghost).await,
            Err(budget_core::LedgerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_entries_in_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let ctx = RequestContext::local();

        let root = EstimateNode::from_new(NewNode::component("C-1", "Works", dec("5000")));
        let item = item_under(&root);
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let entry = budget_core::progress::build_entry(
            &item.id,
            NewProgressEntry::new(day(1), day(31), dec("12.5"), dec("10"), dec("125.07"))
                .with_description("Foundation poured"),
        )
        .unwrap();

        {
            let repo = SqliteRepository::open(&path).unwrap();
            repo.insert_node(&ctx, &root).await.unwrap();
            repo.insert_node(&ctx, &item).await.unwrap();
            repo.insert_entry(&ctx, &entry).await.unwrap();
        }

        let repo = SqliteRepository::open(&path).unwrap();
        let entries = repo.entries(&ctx, &item.id).await.unwrap();
        assert_eq!(entries, vec![entry.clone()]);

        let stats = repo.stats().unwrap();
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.entry_count, 1);

        assert_eq!(repo.delete_entries_for_item(&ctx, &item.id).await.unwrap(), 1);
        assert!(repo.get_entry(&ctx, &entry.id).await.unwrap().is_none());
    }
}
