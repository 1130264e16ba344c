//! Estimate node CRUD operations

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use tracing::debug;

use budget_core::{EstimateLevel, EstimateNode, ItemDetails};

use crate::error::StoreError;

const NODE_COLUMNS: &str = "id, level, code, name, description, estimated_amount, parent_id,
    unit, parameter, institute, created_at, updated_at";

/// Estimate node row as stored
#[derive(Debug, Clone)]
pub struct NodeRow {
    pub id: String,
    pub level: i64,
    pub code: String,
    pub name: String,
    pub description: String,
    pub estimated_amount: String,
    pub parent_id: Option<String>,
    pub unit: Option<String>,
    pub parameter: Option<String>,
    pub institute: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl NodeRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            level: row.get(1)?,
            code: row.get(2)?,
            name: row.get(3)?,
            description: row.get(4)?,
            estimated_amount: row.get(5)?,
            parent_id: row.get(6)?,
            unit: row.get(7)?,
            parameter: row.get(8)?,
            institute: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(value)
        .map_err(|e| StoreError::Parse(format!("{} '{}': {}", field, value, e)))
}

pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Parse(format!("{} '{}': {}", field, value, e)))
}

impl TryFrom<NodeRow> for EstimateNode {
    type Error = StoreError;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        let level = u8::try_from(row.level)
            .ok()
            .and_then(EstimateLevel::from_depth)
            .ok_or_else(|| StoreError::Parse(format!("level {} of node {}", row.level, row.id)))?;

        let details = if level.is_item() {
            Some(ItemDetails {
                unit: row.unit,
                parameter: row.parameter,
                institute: row.institute,
            })
        } else {
            None
        };

        Ok(EstimateNode {
            estimated_amount: parse_decimal("estimated_amount", &row.estimated_amount)?,
            created_at: parse_timestamp("created_at", &row.created_at)?,
            updated_at: parse_timestamp("updated_at", &row.updated_at)?,
            id: row.id,
            level,
            code: row.code,
            name: row.name,
            description: row.description,
            parent_id: row.parent_id,
            details,
        })
    }
}

fn collect_nodes(rows: Vec<NodeRow>) -> Result<Vec<EstimateNode>, StoreError> {
    rows.into_iter().map(EstimateNode::try_from).collect()
}

/// Get a node by ID
pub fn get_node(conn: &Connection, id: &str) -> Result<Option<EstimateNode>, StoreError> {
    let sql = format!("SELECT {} FROM estimate_nodes WHERE id = ?", NODE_COLUMNS);
    let row = conn
        .query_row(&sql, params![id], |row| NodeRow::from_row(row))
        .optional()?;
    row.map(EstimateNode::try_from).transpose()
}

/// List direct children of a node in insertion order
pub fn list_children(conn: &Connection, parent_id: &str) -> Result<Vec<EstimateNode>, StoreError> {
    let sql = format!(
        "SELECT {} FROM estimate_nodes WHERE parent_id = ? ORDER BY rowid",
        NODE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![parent_id], |row| NodeRow::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;
    collect_nodes(rows)
}

/// List all level-1 nodes
pub fn list_roots(conn: &Connection) -> Result<Vec<EstimateNode>, StoreError> {
    let sql = format!(
        "SELECT {} FROM estimate_nodes WHERE parent_id IS NULL ORDER BY rowid",
        NODE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| NodeRow::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;
    collect_nodes(rows)
}

fn detail_columns(node: &EstimateNode) -> (Option<&str>, Option<&str>, Option<&str>) {
    match &node.details {
        Some(d) => (d.unit.as_deref(), d.parameter.as_deref(), d.institute.as_deref()),
        None => (None, None, None),
    }
}

/// Insert a node
pub fn insert_node(conn: &Connection, node: &EstimateNode) -> Result<(), StoreError> {
    let (unit, parameter, institute) = detail_columns(node);
    conn.execute(
        "INSERT INTO estimate_nodes (id, level, code, name, description, estimated_amount,
            parent_id, unit, parameter, institute, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            node.id,
            node.level.depth(),
            node.code,
            node.name,
            node.description,
            node.estimated_amount.to_string(),
            node.parent_id,
            unit,
            parameter,
            institute,
            node.created_at.to_rfc3339(),
            node.updated_at.to_rfc3339(),
        ],
    )?;
    debug!(node_id = %node.id, level = node.level.depth(), "Inserted estimate node");
    Ok(())
}

/// Update a node's editable columns. Returns false if the node is missing.
pub fn update_node(conn: &Connection, node: &EstimateNode) -> Result<bool, StoreError> {
    let (unit, parameter, institute) = detail_columns(node);
    let changed = conn.execute(
        "UPDATE estimate_nodes SET code = ?2, name = ?3, description = ?4, estimated_amount = ?5,
            unit = ?6, parameter = ?7, institute = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            node.id,
            node.code,
            node.name,
            node.description,
            node.estimated_amount.to_string(),
            unit,
            parameter,
            institute,
            node.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(changed > 0)
}

/// Delete a node. Returns false if nothing was deleted.
pub fn delete_node(conn: &Connection, id: &str) -> Result<bool, StoreError> {
    let changed = conn.execute("DELETE FROM estimate_nodes WHERE id = ?", params![id])?;
    Ok(changed > 0)
}

/// Count nodes per level
pub fn count_by_level(conn: &Connection) -> Result<Vec<(u8, u64)>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT level, COUNT(*) FROM estimate_nodes GROUP BY level ORDER BY level")?;
    let counts = stmt
        .query_map([], |row| {
            let level: i64 = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((level as u8, count as u64))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(counts)
}
