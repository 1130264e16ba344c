//! Progress entry CRUD operations

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use budget_core::ProgressEntry;

use crate::error::StoreError;
use crate::nodes::{parse_decimal, parse_timestamp};

const DATE_FORMAT: &str = "%Y-%m-%d";

const ENTRY_COLUMNS: &str = "id, activity_item_id, from_date, to_date,
    physical_progress_description, physical_progress_percentage,
    financial_progress_amount, financial_progress_percentage, recorded_at";

/// Progress entry row as stored
#[derive(Debug, Clone)]
pub struct EntryRow {
    pub id: String,
    pub activity_item_id: String,
    pub from_date: String,
    pub to_date: String,
    pub physical_progress_description: String,
    pub physical_progress_percentage: String,
    pub financial_progress_amount: String,
    pub financial_progress_percentage: String,
    pub recorded_at: String,
}

impl EntryRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            activity_item_id: row.get(1)?,
            from_date: row.get(2)?,
            to_date: row.get(3)?,
            physical_progress_description: row.get(4)?,
            physical_progress_percentage: row.get(5)?,
            financial_progress_amount: row.get(6)?,
            financial_progress_percentage: row.get(7)?,
            recorded_at: row.get(8)?,
        })
    }
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| StoreError::Parse(format!("{} '{}': {}", field, value, e)))
}

impl TryFrom<EntryRow> for ProgressEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(ProgressEntry {
            from_date: parse_date("from_date", &row.from_date)?,
            to_date: parse_date("to_date", &row.to_date)?,
            physical_progress_percentage: parse_decimal(
                "physical_progress_percentage",
                &row.physical_progress_percentage,
            )?,
            financial_progress_amount: parse_decimal(
                "financial_progress_amount",
                &row.financial_progress_amount,
            )?,
            financial_progress_percentage: parse_decimal(
                "financial_progress_percentage",
                &row.financial_progress_percentage,
            )?,
            recorded_at: parse_timestamp("recorded_at", &row.recorded_at)?,
            id: row.id,
            activity_item_id: row.activity_item_id,
            physical_progress_description: row.physical_progress_description,
        })
    }
}

/// List an item's entries, oldest first
pub fn list_entries(conn: &Connection, item_id: &str) -> Result<Vec<ProgressEntry>, StoreError> {
    let sql = format!(
        "SELECT {} FROM progress_entries WHERE activity_item_id = ? ORDER BY rowid",
        ENTRY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![item_id], |row| EntryRow::from_row(row))?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(ProgressEntry::try_from).collect()
}

/// Get an entry by ID
pub fn get_entry(conn: &Connection, entry_id: &str) -> Result<Option<ProgressEntry>, StoreError> {
    let sql = format!("SELECT {} FROM progress_entries WHERE id = ?", ENTRY_COLUMNS);
    let row = conn
        .query_row(&sql, params![entry_id], |row| EntryRow::from_row(row))
        .optional()?;
    row.map(ProgressEntry::try_from).transpose()
}

/// Insert an entry
pub fn insert_entry(conn: &Connection, entry: &ProgressEntry) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO progress_entries (id, activity_item_id, from_date, to_date,
            physical_progress_description, physical_progress_percentage,
            financial_progress_amount, financial_progress_percentage, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.id,
            entry.activity_item_id,
            entry.from_date.format(DATE_FORMAT).to_string(),
            entry.to_date.format(DATE_FORMAT).to_string(),
            entry.physical_progress_description,
            entry.physical_progress_percentage.to_string(),
            entry.financial_progress_amount.to_string(),
            entry.financial_progress_percentage.to_string(),
            entry.recorded_at.to_rfc3339(),
        ],
    )?;
    debug!(entry_id = %entry.id, item_id = %entry.activity_item_id, "Inserted progress entry");
    Ok(())
}

/// Delete an entry. Returns false if nothing was deleted.
pub fn delete_entry(conn: &Connection, entry_id: &str) -> Result<bool, StoreError> {
    let changed = conn.execute("DELETE FROM progress_entries WHERE id = ?", params![entry_id])?;
    Ok(changed > 0)
}

/// Delete every entry of an item
pub fn delete_entries_for_item(conn: &Connection, item_id: &str) -> Result<usize, StoreError> {
    let changed = conn.execute(
        "DELETE FROM progress_entries WHERE activity_item_id = ?",
        params![item_id],
    )?;
    Ok(changed)
}

/// Total number of stored entries
pub fn count_entries(conn: &Connection) -> Result<u64, StoreError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM progress_entries", [], |row| row.get(0))?;
    Ok(count as u64)
}
