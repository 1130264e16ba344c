//! BudgetLedgerService - main entry point for ledger operations.
//!
//! Every write re-reads the affected child set or entry set under the scope
//! lock before validating, so concurrent writers on the same parent or item
//! can never jointly break a ceiling.

use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use budget_core::format::format_amount;
use budget_core::{
    allocation, progress, EstimateNode, LedgerError, LedgerRepository, NewNode, NewProgressEntry,
    NodeRepository, NodeUpdate, ProgressEntry, ProgressSummary, RequestContext, Result,
};

use crate::audit::{AuditEntry, AuditLog, AuditOperation};
use crate::config::{DeletePolicy, LedgerConfig};
use crate::locks::{ScopeGuard, ScopeKey, ScopeLocks};
use crate::report::{build_tree, compute_rollup, BudgetTreeNode, ProgressRollup, Subtree};

/// What a delete removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeletionReport {
    pub nodes_removed: usize,
    pub entries_removed: usize,
}

/// Budget hierarchy and progress ledger over injected repositories.
pub struct BudgetLedgerService {
    /// Configuration
    config: LedgerConfig,
    /// Node storage
    nodes: Arc<dyn NodeRepository>,
    /// Progress entry storage
    ledger: Arc<dyn LedgerRepository>,
    /// Per-parent / per-item write locks
    locks: ScopeLocks,
    /// Audit log
    audit: Arc<AuditLog>,
}

impl BudgetLedgerService {
    /// Create a service over separate node and entry repositories.
    pub fn new(nodes: Arc<dyn NodeRepository>, ledger: Arc<dyn LedgerRepository>) -> Self {
        let config = LedgerConfig::default();
        Self {
            audit: Arc::new(AuditLog::with_max_entries(config.general.audit_max_entries)),
            config,
            nodes,
            ledger,
            locks: ScopeLocks::new(),
        }
    }

    /// Create a service over one repository implementing both seams.
    pub fn with_repository<R>(repo: Arc<R>) -> Self
    where
        R: NodeRepository + LedgerRepository + 'static,
    {
        let nodes: Arc<dyn NodeRepository> = repo.clone();
        let ledger: Arc<dyn LedgerRepository> = repo;
        Self::new(nodes, ledger)
    }

    /// Create with configuration.
    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.audit = Arc::new(AuditLog::with_max_entries(config.general.audit_max_entries));
        self.config = config;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Context using the configured currency symbol.
    pub fn default_context(&self) -> RequestContext {
        RequestContext::local().with_currency(self.config.general.currency_symbol.clone())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch a node, `NotFound` if missing.
    pub async fn get_node(&self, ctx: &RequestContext, node_id: &str) -> Result<EstimateNode> {
        self.nodes
            .get_node(ctx, node_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(node_id.to_string()))
    }

    /// Direct children of a node.
    pub async fn get_children(&self, ctx: &RequestContext, parent_id: &str) -> Result<Vec<EstimateNode>> {
        self.nodes.children(ctx, parent_id).await
    }

    /// All level-1 nodes.
    pub async fn roots(&self, ctx: &RequestContext) -> Result<Vec<EstimateNode>> {
        self.nodes.roots(ctx).await
    }

    /// Sum of the current children's estimates.
    pub async fn used_amount(&self, ctx: &RequestContext, parent_id: &str) -> Result<Decimal> {
        let children = self.nodes.children(ctx, parent_id).await?;
        Ok(allocation::used_amount(&children))
    }

    /// What a parent has left to allocate; zero for an unknown parent.
    pub async fn remaining_amount(&self, ctx: &RequestContext, parent_id: &str) -> Result<Decimal> {
        let parent = self.nodes.get_node(ctx, parent_id).await?;
        if parent.is_none() {
            debug!(parent_id = %parent_id, "Remaining amount requested for unknown parent");
            return Ok(Decimal::ZERO);
        }
        let children = self.nodes.children(ctx, parent_id).await?;
        Ok(allocation::remaining_amount(parent.as_ref(), &children))
    }

    /// Entries of an item, oldest first.
    pub async fn entries(&self, ctx: &RequestContext, item_id: &str) -> Result<Vec<ProgressEntry>> {
        self.ledger.entries(ctx, item_id).await
    }

    /// Cumulative progress of an item, recomputed from all its entries.
    pub async fn get_progress_summary(&self, ctx: &RequestContext, item_id: &str) -> Result<ProgressSummary> {
        let entries = self.ledger.entries(ctx, item_id).await?;
        progress::summarize(item_id, &entries)
    }

    /// Spend over estimate for an item, percent.
    pub async fn budget_utilization(&self, ctx: &RequestContext, item_id: &str) -> Result<Decimal> {
        let item = self.get_node(ctx, item_id).await?;
        let entries = self.ledger.entries(ctx, item_id).await?;
        progress::budget_utilization(&item, &entries)
    }

    // =========================================================================
    // Hierarchy writes
    // =========================================================================

    /// Add a node under its parent's remaining balance.
    pub async fn add_node(&self, ctx: &RequestContext, input: NewNode) -> Result<EstimateNode> {
        let detail = json!({
            "level": input.level.depth(),
            "parent_id": input.parent_id,
            "code": input.code,
            "estimated_amount": input.estimated_amount.to_string(),
        });
        let parent_id = input.parent_id.clone();
        let result = self.add_node_locked(ctx, input).await;
        let target = match &result {
            Ok(node) => Some(node.id.clone()),
            Err(_) => parent_id,
        };
        self.record(ctx, AuditOperation::AddNode, target, &result, detail).await;
        result
    }

    async fn add_node_locked(&self, ctx: &RequestContext, input: NewNode) -> Result<EstimateNode> {
        allocation::validate_amount(input.estimated_amount)?;

        let _guard = self
            .locks
            .acquire(ScopeKey::parent_of(input.parent_id.as_deref()))
            .await;

        let parent = match &input.parent_id {
            Some(parent_id) => self.nodes.get_node(ctx, parent_id).await?,
            None => None,
        };
        allocation::validate_placement(&input, parent.as_ref())?;

        if let Some(parent) = &parent {
            let siblings = self.nodes.children(ctx, &parent.id).await?;
            if let Err(err) = allocation::check_new_child(parent, &siblings, input.estimated_amount) {
                if let LedgerError::BudgetExceeded { requested, remaining } = &err {
                    warn!(
                        parent_id = %parent.id,
                        requested = %format_amount(*requested, &ctx.currency_symbol),
                        remaining = %format_amount(*remaining, &ctx.currency_symbol),
                        "Rejected node: parent budget exceeded"
                    );
                }
                return Err(err);
            }
        }

        let node = EstimateNode::from_new(input);
        self.nodes.insert_node(ctx, &node).await?;

        info!(
            node_id = %node.id,
            level = %node.level,
            parent_id = ?node.parent_id,
            amount = %format_amount(node.estimated_amount, &ctx.currency_symbol),
            actor = %ctx.actor_or_anonymous(),
            "Added estimate node"
        );
        Ok(node)
    }

    /// Edit a node; its own current estimate counts as available.
    pub async fn update_node(
        &self,
        ctx: &RequestContext,
        node_id: &str,
        update: NodeUpdate,
    ) -> Result<EstimateNode> {
        let detail = json!({ "estimated_amount": update.estimated_amount.to_string() });
        let result = self.update_node_locked(ctx, node_id, update).await;
        self.record(ctx, AuditOperation::UpdateNode, Some(node_id.to_string()), &result, detail)
            .await;
        result
    }

    async fn update_node_locked(
        &self,
        ctx: &RequestContext,
        node_id: &str,
        update: NodeUpdate,
    ) -> Result<EstimateNode> {
        // Parent links never change, so the scope can be chosen before locking.
        let located = self.get_node(ctx, node_id).await?;
        allocation::validate_amount(update.estimated_amount)?;

        let _parent_guard = self
            .locks
            .acquire(ScopeKey::parent_of(located.parent_id.as_deref()))
            .await;
        let _own_guard = self.locks.acquire(ScopeKey::node(node_id)).await;

        let mut node = self.get_node(ctx, node_id).await?;
        let (parent, siblings) = match &node.parent_id {
            Some(parent_id) => (
                self.nodes.get_node(ctx, parent_id).await?,
                self.nodes.children(ctx, parent_id).await?,
            ),
            None => (None, Vec::new()),
        };
        let own_children = self.nodes.children(ctx, node_id).await?;

        allocation::check_update(
            &node,
            parent.as_ref(),
            &siblings,
            &own_children,
            update.estimated_amount,
        )?;

        let previous = node.estimated_amount;
        node.apply(update);
        self.nodes.update_node(ctx, &node).await?;

        info!(
            node_id = %node.id,
            previous = %format_amount(previous, &ctx.currency_symbol),
            amount = %format_amount(node.estimated_amount, &ctx.currency_symbol),
            actor = %ctx.actor_or_anonymous(),
            "Updated estimate node"
        );
        Ok(node)
    }

    /// Delete a node according to the configured [`DeletePolicy`].
    pub async fn delete_node(&self, ctx: &RequestContext, node_id: &str) -> Result<DeletionReport> {
        let policy = self.config.policy.delete_policy;
        let result = self.delete_node_locked(ctx, node_id, policy).await;
        let detail = match &result {
            Ok(report) => json!({
                "policy": policy,
                "nodes_removed": report.nodes_removed,
                "entries_removed": report.entries_removed,
            }),
            Err(_) => json!({ "policy": policy }),
        };
        self.record(ctx, AuditOperation::DeleteNode, Some(node_id.to_string()), &result, detail)
            .await;
        result
    }

    async fn delete_node_locked(
        &self,
        ctx: &RequestContext,
        node_id: &str,
        policy: DeletePolicy,
    ) -> Result<DeletionReport> {
        let located = self.get_node(ctx, node_id).await?;

        let _parent_guard = self
            .locks
            .acquire(ScopeKey::parent_of(located.parent_id.as_deref()))
            .await;
        let own_guard = self.locks.acquire(ScopeKey::node(node_id)).await;

        let node = self.get_node(ctx, node_id).await?;

        let report = match policy {
            DeletePolicy::Restrict => {
                let children = self.nodes.children(ctx, node_id).await?;
                let entries = if node.level.is_item() {
                    self.ledger.entries(ctx, node_id).await?
                } else {
                    Vec::new()
                };
                if !children.is_empty() || !entries.is_empty() {
                    return Err(LedgerError::HasDependents {
                        node_id: node_id.to_string(),
                        children: children.len(),
                        entries: entries.len(),
                    });
                }
                self.nodes.delete_node(ctx, node_id).await?;
                DeletionReport {
                    nodes_removed: 1,
                    entries_removed: 0,
                }
            }
            DeletePolicy::Cascade => self.delete_subtree(ctx, node, own_guard).await?,
        };

        info!(
            node_id = %node_id,
            policy = ?policy,
            nodes_removed = report.nodes_removed,
            entries_removed = report.entries_removed,
            actor = %ctx.actor_or_anonymous(),
            "Deleted estimate node"
        );
        Ok(report)
    }

    /// Remove a whole subtree. Every scope inside it is locked top-down and
    /// the subtree re-read until no unlocked node remains, so nothing can be
    /// attached to a node while it is being removed.
    async fn delete_subtree(
        &self,
        ctx: &RequestContext,
        root: EstimateNode,
        root_guard: ScopeGuard<'_>,
    ) -> Result<DeletionReport> {
        let root_id = root.id.clone();
        let mut guards = vec![root_guard];
        let mut locked: HashSet<String> = HashSet::from([root_id.clone()]);

        let subtree = loop {
            let subtree = self.load_subtree(ctx, root.clone()).await?;
            let mut grew = false;
            for node in &subtree.order {
                if locked.insert(node.id.clone()) {
                    guards.push(self.locks.acquire(ScopeKey::node(node.id.clone())).await);
                    grew = true;
                }
            }
            if !grew {
                break subtree;
            }
        };

        let mut report = DeletionReport::default();

        // Descendants first so no node is ever left without its parent.
        for node in subtree.order.iter().rev() {
            if node.level.is_item() {
                report.entries_removed += self.ledger.delete_entries_for_item(ctx, &node.id).await?;
            }
            if self.nodes.delete_node(ctx, &node.id).await? {
                report.nodes_removed += 1;
            }
        }

        drop(guards);

        debug!(root_id = %root_id, nodes = report.nodes_removed, "Cascade delete finished");
        Ok(report)
    }

    // =========================================================================
    // Progress writes
    // =========================================================================

    /// Record progress against a level-5 item.
    pub async fn add_progress_entry(
        &self,
        ctx: &RequestContext,
        item_id: &str,
        input: NewProgressEntry,
    ) -> Result<ProgressEntry> {
        let detail = json!({
            "physical_progress_percentage": input.physical_progress_percentage.to_string(),
            "financial_progress_percentage": input.financial_progress_percentage.to_string(),
            "financial_progress_amount": input.financial_progress_amount.to_string(),
        });
        let result = self.add_progress_entry_locked(ctx, item_id, input).await;
        self.record(
            ctx,
            AuditOperation::AddProgressEntry,
            Some(item_id.to_string()),
            &result,
            detail,
        )
        .await;
        result
    }

    async fn add_progress_entry_locked(
        &self,
        ctx: &RequestContext,
        item_id: &str,
        input: NewProgressEntry,
    ) -> Result<ProgressEntry> {
        progress::validate_entry(&input)?;

        let _guard = self.locks.acquire(ScopeKey::node(item_id)).await;

        let item = self.get_node(ctx, item_id).await?;
        if !item.level.is_item() {
            return Err(LedgerError::Validation(format!(
                "progress can only be recorded against items, {} is {}",
                item.id, item.level
            )));
        }

        let entries = self.ledger.entries(ctx, item_id).await?;
        let summary = progress::summarize(item_id, &entries)?;
        progress::check_entry(&summary, &input)?;

        let entry = progress::build_entry(item_id, input)?;
        self.ledger.insert_entry(ctx, &entry).await?;

        let physical_total = summary.total_physical_progress + entry.physical_progress_percentage;
        info!(
            item_id = %item_id,
            entry_id = %entry.id,
            physical_total = %physical_total,
            spent = %format_amount(entry.financial_progress_amount, &ctx.currency_symbol),
            actor = %ctx.actor_or_anonymous(),
            "Recorded progress entry"
        );
        if physical_total >= progress::FULL_PROGRESS {
            info!(item_id = %item_id, "Item physically complete, ledger locked");
        }
        Ok(entry)
    }

    /// Undo one entry; a completed item re-opens when its physical total
    /// drops below 100 again.
    pub async fn remove_progress_entry(
        &self,
        ctx: &RequestContext,
        entry_id: &str,
    ) -> Result<ProgressSummary> {
        let result = self.remove_progress_entry_locked(ctx, entry_id).await;
        let detail = match &result {
            Ok(summary) => json!({
                "activity_item_id": summary.activity_item_id,
                "completed": summary.completed,
            }),
            Err(_) => json!({}),
        };
        self.record(
            ctx,
            AuditOperation::RemoveProgressEntry,
            Some(entry_id.to_string()),
            &result,
            detail,
        )
        .await;
        result
    }

    async fn remove_progress_entry_locked(
        &self,
        ctx: &RequestContext,
        entry_id: &str,
    ) -> Result<ProgressSummary> {
        let entry = self
            .ledger
            .get_entry(ctx, entry_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(entry_id.to_string()))?;
        let item_id = entry.activity_item_id;

        let _guard = self.locks.acquire(ScopeKey::node(item_id.clone())).await;

        if !self.ledger.delete_entry(ctx, entry_id).await? {
            return Err(LedgerError::NotFound(entry_id.to_string()));
        }

        let entries = self.ledger.entries(ctx, &item_id).await?;
        let summary = progress::summarize(&item_id, &entries)?;
        info!(
            item_id = %item_id,
            entry_id = %entry_id,
            state = ?summary.state(),
            "Removed progress entry"
        );
        Ok(summary)
    }

    // =========================================================================
    // Reports
    // =========================================================================

    /// Aggregate progress of any node from its descendant items.
    pub async fn rollup(&self, ctx: &RequestContext, node_id: &str) -> Result<ProgressRollup> {
        let node = self.get_node(ctx, node_id).await?;
        let subtree = self.load_subtree(ctx, node.clone()).await?;

        let mut items = Vec::new();
        for item in subtree.items() {
            let entries = self.ledger.entries(ctx, &item.id).await?;
            items.push((item.clone(), progress::summarize(&item.id, &entries)?));
        }

        compute_rollup(&node, &items)
    }

    /// Nested view of a node's subtree with used/remaining figures.
    pub async fn tree(&self, ctx: &RequestContext, root_id: &str) -> Result<BudgetTreeNode> {
        let root = self.get_node(ctx, root_id).await?;
        let subtree = self.load_subtree(ctx, root.clone()).await?;
        Ok(build_tree(&root, &subtree))
    }

    /// Recent audit entries, newest first.
    pub async fn audit_log(&self, limit: usize) -> Vec<AuditEntry> {
        self.audit.recent(limit).await
    }

    /// Breadth-first load of a node and all its descendants.
    async fn load_subtree(&self, ctx: &RequestContext, root: EstimateNode) -> Result<Subtree> {
        let mut subtree = Subtree::default();
        let mut queue = VecDeque::from([root]);

        while let Some(node) = queue.pop_front() {
            let children = if node.level.is_item() {
                Vec::new()
            } else {
                self.nodes.children(ctx, &node.id).await?
            };
            queue.extend(children.iter().cloned());
            subtree.children.insert(node.id.clone(), children);
            subtree.order.push(node);
        }

        Ok(subtree)
    }

    async fn record<T>(
        &self,
        ctx: &RequestContext,
        operation: AuditOperation,
        target_id: Option<String>,
        result: &Result<T>,
        detail: serde_json::Value,
    ) {
        if !self.config.general.audit_enabled {
            return;
        }
        let entry = AuditEntry::new(ctx, operation, target_id, result.as_ref().err(), detail);
        self.audit.record(entry).await;
    }
}
