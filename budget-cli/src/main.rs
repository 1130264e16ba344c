//! Budget Ledger CLI
//!
//! Command line front-end over a SQLite-backed ledger.
//!
//! ## Usage
//!
//! ```bash
//! # Write a default config file
//! budget-ledger init-config
//!
//! # Build a hierarchy
//! budget-ledger add-node --level 1 --code C1 --name "Civil works" --amount 10000
//! budget-ledger add-node --level 2 --parent <id> --code S1 --name "Roads" --amount 4000
//! budget-ledger remaining <id>
//!
//! # Record progress against an item
//! budget-ledger add-entry <item> --from 2024-03-01 --to 2024-03-31 \
//!     --physical 25 --financial 20 --amount 800
//! budget-ledger summary <item>
//! ```
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use budget_core::{
    EstimateLevel, ItemDetails, NewNode, NewProgressEntry, NodeUpdate, RequestContext,
};
use budget_ledger::{BudgetLedgerService, DeletePolicy, LedgerConfig};
use budget_store::SqliteRepository;

#[derive(Parser, Debug)]
#[command(name = "budget-ledger")]
#[command(about = "Hierarchical budget allocation and progress ledger")]
struct Args {
    /// Path to config file (TOML, or YAML by extension)
    #[arg(short, long, env = "BUDGET_LEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory holding the database
    #[arg(long, env = "BUDGET_LEDGER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Currency symbol for formatted amounts
    #[arg(long, env = "BUDGET_LEDGER_CURRENCY")]
    currency: Option<String>,

    /// Who is acting, recorded in the audit trail
    #[arg(long, env = "BUDGET_LEDGER_ACTOR")]
    actor: Option<String>,

    /// Auth token handed to the repository
    #[arg(long, env = "BUDGET_LEDGER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add an estimate node
    AddNode {
        /// Level 1-5
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        level: u8,
        /// Parent node id (omit for level 1)
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        code: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long, default_value = "")]
        description: String,
        /// Item unit (level 5 only)
        #[arg(long)]
        unit: Option<String>,
        /// Item parameter (level 5 only)
        #[arg(long)]
        parameter: Option<String>,
        /// Item institute (level 5 only)
        #[arg(long)]
        institute: Option<String>,
    },
    /// Edit a node's estimate and display fields
    UpdateNode {
        id: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a node
    DeleteNode {
        id: String,
        /// Remove the whole subtree and its entries regardless of config
        #[arg(long)]
        cascade: bool,
    },
    /// List direct children of a node
    Children { id: String },
    /// Show one node
    Show { id: String },
    /// Used and remaining amount of a node
    Remaining { id: String },
    /// Record progress against an item
    AddEntry {
        item: String,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        /// Physical progress this period, percent
        #[arg(long)]
        physical: Decimal,
        /// Financial progress this period, percent
        #[arg(long)]
        financial: Decimal,
        /// Money spent this period
        #[arg(long)]
        amount: Decimal,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Undo a progress entry
    RemoveEntry { id: String },
    /// Progress summary and budget utilization of an item
    Summary { item: String },
    /// Progress roll-up of any node
    Rollup { id: String },
    /// Allocation tree under a node, or under every component
    Tree { id: Option<String> },
    /// Write the effective config to a file
    InitConfig {
        /// Destination (defaults to the data directory)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Serialize)]
struct Allocation {
    node_id: String,
    estimated_amount: Decimal,
    used_amount: Decimal,
    remaining_amount: Decimal,
    formatted_remaining: String,
}

#[derive(Serialize)]
struct ItemReport {
    #[serde(flatten)]
    summary: budget_core::ProgressSummary,
    budget_utilization: Decimal,
}

fn load_config(args: &Args) -> anyhow::Result<LedgerConfig> {
    let mut config = match &args.config {
        Some(path) => LedgerConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            let default_path = LedgerConfig::default_path();
            if default_path.exists() {
                LedgerConfig::load(&default_path)?
            } else {
                LedgerConfig::default()
            }
        }
    };

    // Apply CLI overrides
    if let Some(dir) = &args.data_dir {
        config.storage.data_dir = dir.clone();
    }
    if let Some(symbol) = &args.currency {
        config.general.currency_symbol = symbol.clone();
    }
    if let Some(level) = &args.log_level {
        config.general.log_level = level.clone();
    }
    Ok(config)
}

/// Filter used when RUST_LOG is unset. The binary target shares the
/// `budget_ledger` path with the service crate, so one directive covers both.
fn default_directives(level: &str) -> String {
    format!("budget_ledger={level},budget_store={level}")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(&config.general.log_level)))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Command::InitConfig { path, force } = &args.command {
        let path = path.clone().unwrap_or_else(LedgerConfig::default_path);
        if path.exists() && !force {
            return Err(anyhow!("{} already exists, use --force to overwrite", path.display()));
        }
        config.save(&path)?;
        info!(path = %path.display(), "Wrote config");
        return Ok(());
    }

    let db_path = config.database_path();
    debug!(path = %db_path.display(), "Opening ledger database");
    let repo = Arc::new(
        SqliteRepository::open(&db_path)
            .with_context(|| format!("opening database {}", db_path.display()))?,
    );

    let mut ctx = RequestContext::local().with_currency(config.general.currency_symbol.clone());
    if let Some(actor) = &args.actor {
        ctx = ctx.with_actor(actor.clone());
    }
    if let Some(token) = &args.token {
        ctx = ctx.with_token(token.clone());
    }

    let mut config = config;
    if let Command::DeleteNode { cascade: true, .. } = &args.command {
        config.policy.delete_policy = DeletePolicy::Cascade;
    }
    let service = BudgetLedgerService::with_repository(repo).with_config(config);

    run(&service, &ctx, args.command).await
}

async fn run(service: &BudgetLedgerService, ctx: &RequestContext, command: Command) -> anyhow::Result<()> {
    match command {
        Command::AddNode {
            level,
            parent,
            code,
            name,
            amount,
            description,
            unit,
            parameter,
            institute,
        } => {
            let level = EstimateLevel::from_depth(level).ok_or_else(|| anyhow!("invalid level {level}"))?;
            let mut input = match parent {
                Some(parent) => NewNode::child(level, parent, code, name, amount),
                None => {
                    let mut input = NewNode::component(code, name, amount);
                    input.level = level;
                    input
                }
            }
            .with_description(description);
            if unit.is_some() || parameter.is_some() || institute.is_some() {
                input = input.with_details(ItemDetails {
                    unit,
                    parameter,
                    institute,
                });
            }
            print_json(&service.add_node(ctx, input).await?)
        }
        Command::UpdateNode {
            id,
            amount,
            code,
            name,
            description,
        } => {
            let update = NodeUpdate {
                code,
                name,
                description,
                ..NodeUpdate::amount(amount)
            };
            print_json(&service.update_node(ctx, &id, update).await?)
        }
        Command::DeleteNode { id, .. } => print_json(&service.delete_node(ctx, &id).await?),
        Command::Children { id } => print_json(&service.get_children(ctx, &id).await?),
        Command::Show { id } => print_json(&service.get_node(ctx, &id).await?),
        Command::Remaining { id } => {
            let node = service.get_node(ctx, &id).await?;
            let remaining = service.remaining_amount(ctx, &id).await?;
            print_json(&Allocation {
                node_id: node.id,
                estimated_amount: node.estimated_amount,
                used_amount: service.used_amount(ctx, &id).await?,
                remaining_amount: remaining,
                formatted_remaining: budget_core::format::format_amount(remaining, &ctx.currency_symbol),
            })
        }
        Command::AddEntry {
            item,
            from,
            to,
            physical,
            financial,
            amount,
            description,
        } => {
            let input = NewProgressEntry::new(from, to, physical, financial, amount)
                .with_description(description);
            print_json(&service.add_progress_entry(ctx, &item, input).await?)
        }
        Command::RemoveEntry { id } => print_json(&service.remove_progress_entry(ctx, &id).await?),
        Command::Summary { item } => {
            let summary = service.get_progress_summary(ctx, &item).await?;
            let budget_utilization = service.budget_utilization(ctx, &item).await?;
            print_json(&ItemReport {
                summary,
                budget_utilization,
            })
        }
        Command::Rollup { id } => print_json(&service.rollup(ctx, &id).await?),
        Command::Tree { id: Some(id) } => print_json(&service.tree(ctx, &id).await?),
        Command::Tree { id: None } => {
            let mut trees = Vec::new();
            for root in service.roots(ctx).await? {
                trees.push(service.tree(ctx, &root.id).await?);
            }
            print_json(&trees)
        }
        Command::InitConfig { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_default_directives_name_real_targets() {
        let directives = default_directives("debug");
        assert_eq!(directives, "budget_ledger=debug,budget_store=debug");
        assert!(EnvFilter::try_new(&directives).is_ok());
        assert_eq!(module_path!(), "budget_ledger::tests");
    }

    #[test]
    fn test_parse_add_entry() {
        let args = Args::try_parse_from([
            "budget-ledger",
            "add-entry",
            "item-1",
            "--from",
            "2024-03-01",
            "--to",
            "2024-03-31",
            "--physical",
            "25",
            "--financial",
            "20.5",
            "--amount",
            "800.75",
        ])
        .unwrap();
        match args.command {
            Command::AddEntry { item, amount, .. } => {
                assert_eq!(item, "item-1");
                assert_eq!(amount.to_string(), "800.75");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
