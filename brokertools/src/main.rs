//! Operations tooling for the expert work broker.
//!
//! Wraps the engine's inbound operations for admins and scripts: order intake, candidate ranking, claims,
//! lifecycle transitions, disputes and statistics, all against the database named by `EWB_DATABASE_URL`.
mod commands;
mod formatting;

use anyhow::Result;
use clap::{Parser, Subcommand};
use work_broker_engine::SqliteDatabase;

use crate::commands::*;

#[derive(Parser)]
#[command(name = "brokertools", about = "Admin tooling for the expert work broker", version)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create the database (if needed) and apply the schema migrations
    Init,
    /// Create a new order
    NewOrder(NewOrderArgs),
    /// Show a single order
    Order {
        /// The external order id
        order_id: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List orders, optionally filtered by client, expert or status
    Orders(OrdersArgs),
    /// Rank the candidate experts for an order
    Candidates {
        order_id: String,
        /// How many candidates to return
        #[arg(short, long)]
        limit: Option<usize>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Claim an order for an expert
    Take { order_id: String, expert_id: i64 },
    /// Fire a lifecycle event against an order on behalf of an actor
    Transition(TransitionArgs),
    /// Cancel unclaimed orders whose deadline has passed
    Expire,
    /// Open a dispute on an order
    Dispute(DisputeArgs),
    /// Assign an arbitrator to a dispute
    Arbitrate { dispute_id: i64, arbitrator_id: i64 },
    /// Resolve a dispute
    Resolve(ResolveArgs),
    /// Rate a completed order
    Rate(RateArgs),
    /// Show (or rebuild) an expert's statistics
    Stats {
        expert_id: i64,
        /// Rebuild the aggregates from the source rows before showing them
        #[arg(long)]
        rebuild: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Create or update an expert's specialization
    Qualify(QualifyArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let cli = Cli::parse();
    if let Command::Init = cli.command {
        return init_database().await;
    }
    let db = SqliteDatabase::new().await?;
    match cli.command {
        // handled above, before the connection is opened
        Command::Init => Ok(()),
        Command::NewOrder(args) => create_order(&db, args).await,
        Command::Order { order_id, json } => show_order(&db, &order_id, json).await,
        Command::Orders(args) => list_orders(&db, args).await,
        Command::Candidates { order_id, limit, json } => list_candidates(&db, &order_id, limit, json).await,
        Command::Take { order_id, expert_id } => take_order(&db, &order_id, expert_id).await,
        Command::Transition(args) => transition_order(&db, args).await,
        Command::Expire => expire_orders(&db).await,
        Command::Dispute(args) => open_dispute(&db, args).await,
        Command::Arbitrate { dispute_id, arbitrator_id } => assign_arbitrator(&db, dispute_id, arbitrator_id).await,
        Command::Resolve(args) => resolve_dispute(&db, args).await,
        Command::Rate(args) => rate_order(&db, args).await,
        Command::Stats { expert_id, rebuild, json } => show_stats(&db, expert_id, rebuild, json).await,
        Command::Qualify(args) => qualify_expert(&db, args).await,
    }
}
