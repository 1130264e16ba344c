//! Error types for budget ledger operations.

use rust_decimal::Decimal;

use crate::types::ProgressKind;

/// Every way a ledger operation can be rejected.
///
/// None of these are fatal: each is a refused operation the caller can
/// recover from.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    /// Malformed or missing input
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Estimate larger than what the parent has left
    #[error("Budget exceeded: requested {requested}, remaining {remaining}")]
    BudgetExceeded { requested: Decimal, remaining: Decimal },

    /// Cumulative percentage would pass 100
    #[error("{kind} progress exceeded: current total {current}%, requested {requested}%")]
    ProgressExceeded {
        kind: ProgressKind,
        current: Decimal,
        requested: Decimal,
    },

    /// Item is physically complete
    #[error("Item {item_id} is complete and accepts no further progress")]
    Locked { item_id: String },

    /// Referenced node, item or entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Delete refused while children or progress entries reference the node
    #[error("Node {node_id} still has {children} children and {entries} progress entries")]
    HasDependents {
        node_id: String,
        children: usize,
        entries: usize,
    },

    /// Backing store failed
    #[error("Repository error: {0}")]
    Repository(String),
}

impl LedgerError {
    /// Rejection for a total too large to represent.
    pub fn out_of_range(what: &str) -> Self {
        Self::Validation(format!("{} is out of range", what))
    }

    /// Short machine-readable tag, used in audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::ProgressExceeded { .. } => "progress_exceeded",
            Self::Locked { .. } => "locked",
            Self::NotFound(_) => "not_found",
            Self::HasDependents { .. } => "has_dependents",
            Self::Repository(_) => "repository",
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
