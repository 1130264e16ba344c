//! Budget ledger service.
//!
//! Ties the allocation and progress rules of `budget-core` to a repository,
//! serialising writes per scope so concurrent callers cannot jointly break a
//! parent's ceiling or push an item past 100%.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │              BudgetLedgerService               │
//! │  ┌────────────┐  ┌────────────┐  ┌──────────┐  │
//! │  │ ScopeLocks │  │  AuditLog  │  │  Config  │  │
//! │  └────────────┘  └────────────┘  └──────────┘  │
//! └───────────┬───────────────────────┬────────────┘
//!             │                       │
//!      NodeRepository          LedgerRepository
//!             │                       │
//!      InMemory / SQLite       InMemory / SQLite
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use budget_ledger::BudgetLedgerService;
//! use budget_core::{InMemoryRepository, NewNode};
//!
//! let service = BudgetLedgerService::with_repository(Arc::new(InMemoryRepository::new()));
//! let ctx = service.default_context();
//! let root = service.add_node(&ctx, NewNode::component("C1", "Civil works", amount)).await?;
//! let remaining = service.remaining_amount(&ctx, &root.id).await?;
//! ```

pub mod audit;
pub mod config;
pub mod locks;
pub mod report;
pub mod service;

pub use audit::{AuditEntry, AuditLog, AuditOperation, AuditOutcome};
pub use config::{ConfigError, DeletePolicy, GeneralConfig, LedgerConfig, PolicyConfig, StorageConfig};
pub use locks::{ScopeGuard, ScopeKey, ScopeLocks};
pub use report::{BudgetTreeNode, ProgressRollup};
pub use service::{BudgetLedgerService, DeletionReport};
