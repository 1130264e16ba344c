//! Core types for the budget hierarchy.
//!
//! These types model the 5-level estimate hierarchy (component down to item)
//! and the progress entries recorded against level-5 items.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Estimate hierarchy level.
///
/// Each level's parent sits exactly one level above it. Only `Item` nodes
/// carry progress entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EstimateLevel {
    /// Level 1 - top of the tree, no parent
    Component = 1,
    /// Level 2
    SubComponent = 2,
    /// Level 3
    Activity = 3,
    /// Level 4
    SubActivity = 4,
    /// Level 5 - leaf items that progress is tracked against
    Item = 5,
}

impl EstimateLevel {
    /// Numeric depth (1-5).
    pub fn depth(&self) -> u8 {
        *self as u8
    }

    /// Level from its numeric depth.
    pub fn from_depth(depth: u8) -> Option<Self> {
        match depth {
            1 => Some(Self::Component),
            2 => Some(Self::SubComponent),
            3 => Some(Self::Activity),
            4 => Some(Self::SubActivity),
            5 => Some(Self::Item),
            _ => None,
        }
    }

    /// The level a parent of this level must have.
    pub fn parent_level(&self) -> Option<Self> {
        Self::from_depth(self.depth() - 1)
    }

    /// The level children of this level must have.
    pub fn child_level(&self) -> Option<Self> {
        Self::from_depth(self.depth() + 1)
    }

    pub fn is_item(&self) -> bool {
        matches!(self, Self::Item)
    }

    /// Get string representation for logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Component => "COMPONENT",
            Self::SubComponent => "SUB_COMPONENT",
            Self::Activity => "ACTIVITY",
            Self::SubActivity => "SUB_ACTIVITY",
            Self::Item => "ITEM",
        }
    }

    /// All levels from the top of the tree down.
    pub fn all_descending() -> Vec<Self> {
        vec![
            Self::Component,
            Self::SubComponent,
            Self::Activity,
            Self::SubActivity,
            Self::Item,
        ]
    }
}

impl std::fmt::Display for EstimateLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{} {}", self.depth(), self.as_str())
    }
}

/// Descriptive metadata only level-5 items carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub unit: Option<String>,
    pub parameter: Option<String>,
    pub institute: Option<String>,
}

/// A single budget line in the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateNode {
    /// Unique identifier
    pub id: String,
    /// Hierarchy level, fixed at creation
    pub level: EstimateLevel,
    /// Short human-readable code
    pub code: String,
    /// Display name
    pub name: String,
    /// Display description
    pub description: String,
    /// Budget ceiling for this node and its descendants
    pub estimated_amount: Decimal,
    /// Parent node one level up; `None` only for components
    pub parent_id: Option<String>,
    /// Item metadata (level 5 only)
    pub details: Option<ItemDetails>,
    /// When the node was created
    pub created_at: DateTime<Utc>,
    /// When the node was last edited
    pub updated_at: DateTime<Utc>,
}

impl EstimateNode {
    /// Build a node from creation input, assigning a fresh id.
    pub fn from_new(input: NewNode) -> Self {
        let now = Utc::now();
        let details = if input.level.is_item() {
            Some(input.details.unwrap_or_default())
        } else {
            None
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            level: input.level,
            code: input.code,
            name: input.name,
            description: input.description,
            estimated_amount: input.estimated_amount,
            parent_id: input.parent_id,
            details,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an edit, leaving level and parent untouched.
    pub fn apply(&mut self, update: NodeUpdate) {
        self.estimated_amount = update.estimated_amount;
        if let Some(code) = update.code {
            self.code = code;
        }
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if self.level.is_item() {
            if let Some(details) = update.details {
                self.details = Some(details);
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Input for creating a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNode {
    pub level: EstimateLevel,
    pub parent_id: Option<String>,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub estimated_amount: Decimal,
    #[serde(default)]
    pub details: Option<ItemDetails>,
}

impl NewNode {
    /// Create input for a top-level component.
    pub fn component(code: impl Into<String>, name: impl Into<String>, estimated_amount: Decimal) -> Self {
        Self {
            level: EstimateLevel::Component,
            parent_id: None,
            code: code.into(),
            name: name.into(),
            description: String::new(),
            estimated_amount,
            details: None,
        }
    }

    /// Create input for a child of `parent_id` at `level`.
    pub fn child(
        level: EstimateLevel,
        parent_id: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
        estimated_amount: Decimal,
    ) -> Self {
        Self {
            level,
            parent_id: Some(parent_id.into()),
            code: code.into(),
            name: name.into(),
            description: String::new(),
            estimated_amount,
            details: None,
        }
    }

    /// Builder: set description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: set item metadata.
    pub fn with_details(mut self, details: ItemDetails) -> Self {
        self.details = Some(details);
        self
    }
}

/// Input for editing a node. `None` fields keep their current value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub estimated_amount: Decimal,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub details: Option<ItemDetails>,
}

impl NodeUpdate {
    /// Change only the estimated amount.
    pub fn amount(estimated_amount: Decimal) -> Self {
        Self {
            estimated_amount,
            code: None,
            name: None,
            description: None,
            details: None,
        }
    }

    /// Builder: rename.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A dated progress record against a level-5 item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub id: String,
    pub activity_item_id: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub physical_progress_description: String,
    /// Share of physical work done in this period, (0, 100]
    pub physical_progress_percentage: Decimal,
    /// Money spent in this period
    pub financial_progress_amount: Decimal,
    /// Share of the financial plan spent in this period, (0, 100]
    pub financial_progress_percentage: Decimal,
    pub recorded_at: DateTime<Utc>,
}

/// Input for recording progress. Dates are optional so missing input can be
/// reported as a validation failure rather than a parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProgressEntry {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    #[serde(default)]
    pub physical_progress_description: String,
    pub physical_progress_percentage: Decimal,
    pub financial_progress_amount: Decimal,
    pub financial_progress_percentage: Decimal,
}

impl NewProgressEntry {
    pub fn new(
        from_date: NaiveDate,
        to_date: NaiveDate,
        physical_progress_percentage: Decimal,
        financial_progress_percentage: Decimal,
        financial_progress_amount: Decimal,
    ) -> Self {
        Self {
            from_date: Some(from_date),
            to_date: Some(to_date),
            physical_progress_description: String::new(),
            physical_progress_percentage,
            financial_progress_amount,
            financial_progress_percentage,
        }
    }

    /// Builder: set the physical progress description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.physical_progress_description = description.into();
        self
    }
}

/// Which cumulative percentage a check is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Physical,
    Financial,
}

impl std::fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Physical => write!(f, "physical"),
            Self::Financial => write!(f, "financial"),
        }
    }
}

/// Ledger state of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerState {
    /// Accepting entries
    Open,
    /// Physical progress reached 100%
    Completed,
}

/// Cumulative progress of one item, always derived from its full entry set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub activity_item_id: String,
    pub total_physical_progress: Decimal,
    pub total_financial_progress: Decimal,
    pub total_financial_amount: Decimal,
    pub entry_count: usize,
    /// Physical progress reached 100 - gates further entries
    pub completed: bool,
    /// Financial progress reached 100 - informational only
    pub financially_complete: bool,
}

impl ProgressSummary {
    pub fn state(&self) -> LedgerState {
        if self.completed {
            LedgerState::Completed
        } else {
            LedgerState::Open
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_navigation() {
        assert_eq!(EstimateLevel::Component.parent_level(), None);
        assert_eq!(
            EstimateLevel::Item.parent_level(),
            Some(EstimateLevel::SubActivity)
        );
        assert_eq!(EstimateLevel::Item.child_level(), None);
        assert_eq!(EstimateLevel::from_depth(3), Some(EstimateLevel::Activity));
        assert_eq!(EstimateLevel::from_depth(6), None);
    }

    #[test]
    fn test_details_only_on_items() {
        let component = EstimateNode::from_new(
            NewNode::component("C1", "Roads", Decimal::from(100))
                .with_details(ItemDetails::default()),
        );
        assert!(component.details.is_none());

        let item = EstimateNode::from_new(NewNode::child(
            EstimateLevel::Item,
            "parent",
            "I1",
            "Gravel",
            Decimal::from(10),
        ));
        assert_eq!(item.details, Some(ItemDetails::default()));
    }

    #[test]
    fn test_apply_keeps_identity() {
        let mut node = EstimateNode::from_new(NewNode::component("C1", "Roads", Decimal::from(100)));
        let id = node.id.clone();
        node.apply(NodeUpdate::amount(Decimal::from(250)).with_name("Bridges"));
        assert_eq!(node.id, id);
        assert_eq!(node.level, EstimateLevel::Component);
        assert_eq!(node.estimated_amount, Decimal::from(250));
        assert_eq!(node.name, "Bridges");
        assert_eq!(node.code, "C1");
    }
}
