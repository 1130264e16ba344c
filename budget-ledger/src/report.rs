//! Roll-ups and tree views over a subtree.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use budget_core::{
    allocation, progress, EstimateLevel, EstimateNode, LedgerError, ProgressSummary, Result,
};

/// A node with its children loaded, in breadth-first order.
#[derive(Debug, Clone, Default)]
pub struct Subtree {
    /// Nodes root first, ancestors always before descendants
    pub order: Vec<EstimateNode>,
    /// Direct children by parent id
    pub children: HashMap<String, Vec<EstimateNode>>,
}

impl Subtree {
    /// Level-5 items in the subtree.
    pub fn items(&self) -> impl Iterator<Item = &EstimateNode> {
        self.order.iter().filter(|n| n.level.is_item())
    }

    pub fn children_of(&self, id: &str) -> &[EstimateNode] {
        self.children.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Aggregate progress of a node computed from its descendant items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRollup {
    pub node_id: String,
    pub level: EstimateLevel,
    pub estimated_amount: Decimal,
    pub items_total: usize,
    pub items_completed: usize,
    /// Estimate-weighted physical progress of the items, percent
    pub physical_progress: Decimal,
    /// Estimate-weighted financial progress of the items, percent
    pub financial_progress: Decimal,
    /// Money spent across all items
    pub financial_spent: Decimal,
    /// `financial_spent` over this node's estimate, percent
    pub utilization: Decimal,
}

fn weighted(pairs: &[(Decimal, Decimal)], what: &str) -> Result<Decimal> {
    let overflow = || LedgerError::out_of_range(what);
    let mut weight = Decimal::ZERO;
    let mut total = Decimal::ZERO;
    for (w, v) in pairs {
        weight = weight.checked_add(*w).ok_or_else(overflow)?;
        total = w
            .checked_mul(*v)
            .and_then(|product| total.checked_add(product))
            .ok_or_else(overflow)?;
    }
    if weight.is_zero() {
        return Ok(Decimal::ZERO);
    }
    total.checked_div(weight).ok_or_else(overflow)
}

/// Combine item summaries into a roll-up for `node`.
///
/// Fails with `Validation` when a total no longer fits in a `Decimal`.
pub fn compute_rollup(
    node: &EstimateNode,
    items: &[(EstimateNode, ProgressSummary)],
) -> Result<ProgressRollup> {
    let physical: Vec<(Decimal, Decimal)> = items
        .iter()
        .map(|(item, s)| (item.estimated_amount, s.total_physical_progress))
        .collect();
    let financial: Vec<(Decimal, Decimal)> = items
        .iter()
        .map(|(item, s)| (item.estimated_amount, s.total_financial_progress))
        .collect();

    let mut financial_spent = Decimal::ZERO;
    for (_, summary) in items {
        financial_spent = financial_spent
            .checked_add(summary.total_financial_amount)
            .ok_or_else(|| LedgerError::out_of_range("financial spend total"))?;
    }

    let utilization = if node.estimated_amount.is_zero() {
        Decimal::ZERO
    } else {
        progress::percent_of(financial_spent, node.estimated_amount)
            .ok_or_else(|| LedgerError::out_of_range("utilization"))?
    };

    Ok(ProgressRollup {
        node_id: node.id.clone(),
        level: node.level,
        estimated_amount: node.estimated_amount,
        items_total: items.len(),
        items_completed: items.iter().filter(|(_, s)| s.completed).count(),
        physical_progress: weighted(&physical, "physical roll-up")?,
        financial_progress: weighted(&financial, "financial roll-up")?,
        financial_spent,
        utilization,
    })
}

/// A node with its allocation figures and children, for reports.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetTreeNode {
    pub node: EstimateNode,
    pub used_amount: Decimal,
    pub remaining_amount: Decimal,
    pub children: Vec<BudgetTreeNode>,
}

impl BudgetTreeNode {
    /// Number of nodes in this tree, self included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(|c| c.size()).sum::<usize>()
    }
}

/// Build the nested view of a loaded subtree.
pub fn build_tree(root: &EstimateNode, subtree: &Subtree) -> BudgetTreeNode {
    let children = subtree.children_of(&root.id);
    BudgetTreeNode {
        node: root.clone(),
        used_amount: allocation::used_amount(children),
        remaining_amount: allocation::remaining_amount(Some(root), children),
        children: children.iter().map(|c| build_tree(c, subtree)).collect(),
    }
}
