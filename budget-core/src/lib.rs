//! Budget hierarchy and progress ledger rules.
//!
//! This crate implements the 5-level estimate hierarchy with allocation ceilings:
//!
//! - **Component** (L1): top-level budget lines, no ceiling above them
//! - **Sub-Component** (L2), **Activity** (L3), **Sub-Activity** (L4)
//! - **Item** (L5): leaf lines that progress is recorded against
//!
//! A child's estimate never exceeds what its parent has left, and an item's
//! cumulative physical and financial progress never passes 100%.
//!
//! # Key Components
//!
//! - [`allocation`]: used/remaining amounts and the add/edit ceiling checks
//! - [`progress`]: progress summaries, entry checks and budget utilization
//! - [`NodeRepository`] / [`LedgerRepository`]: storage seams
//! - [`InMemoryRepository`]: storage for tests and embedding
//!
//! # Example
//!
//! ```ignore
//! use budget_core::{allocation, EstimateNode, NewNode};
//!
//! let children = repo.children(&ctx, &parent.id).await?;
//! allocation::check_new_child(&parent, &children, amount)?;
//! ```

pub mod allocation;
pub mod context;
pub mod error;
pub mod format;
pub mod memory;
pub mod progress;
pub mod repository;
pub mod types;

// Re-export main types
pub use context::RequestContext;
pub use error::{LedgerError, Result};
pub use memory::InMemoryRepository;
pub use repository::{LedgerRepository, NodeRepository};
pub use types::*;
