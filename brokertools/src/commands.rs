use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use clap::Args;
use ewb_common::Money;
use log::info;
use work_broker_engine::{
    db_types::{DisputeOutcome, NewOrder, NewSpecialization, OrderId, OrderStatusType, WorkType},
    events::EventProducers,
    order_objects::OrderQueryFilter,
    Actor,
    AssignmentApi,
    CompensationPolicy,
    DisputeApi,
    LoggingPaymentGateway,
    OrderEvent,
    OrderFlowApi,
    Role,
    SqliteDatabase,
    StatisticsApi,
};

use crate::formatting::{print_candidates, print_dispute, print_orders, print_statistics};

#[derive(Debug, Args)]
pub struct NewOrderArgs {
    /// The external order id
    pub order_id: String,
    /// The client placing the order
    #[arg(short, long)]
    pub client: i64,
    /// The budget in dollars
    #[arg(short, long)]
    pub budget: f64,
    /// The subject the work falls under
    #[arg(short, long)]
    pub subject: Option<String>,
    /// essay, coursework, thesis, lab_report, presentation or other
    #[arg(short, long, default_value = "other")]
    pub work_type: String,
    /// Difficulty from 1 (trivial) to 5 (hard)
    #[arg(long, default_value_t = 1)]
    pub complexity: i64,
    /// Days until the hand-in deadline
    #[arg(short, long, default_value_t = 7)]
    pub deadline_days: i64,
}

#[derive(Debug, Args)]
pub struct OrdersArgs {
    #[arg(short, long)]
    pub client: Option<i64>,
    #[arg(short, long)]
    pub expert: Option<i64>,
    #[arg(short, long)]
    pub status: Option<String>,
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct TransitionArgs {
    pub order_id: String,
    /// payment_initiated, payment_confirmed, submitted, revision_requested, accepted, resubmitted or cancelled
    pub event: String,
    /// The id of the acting user (ignored for --role system)
    #[arg(short, long, default_value_t = 0)]
    pub actor: i64,
    /// client, expert or system
    #[arg(short, long)]
    pub role: String,
}

#[derive(Debug, Args)]
pub struct DisputeArgs {
    pub order_id: String,
    /// The id of the party raising the dispute
    #[arg(short, long)]
    pub actor: i64,
    /// client or expert
    #[arg(short, long)]
    pub role: String,
    /// Why the order is in conflict
    #[arg(long)]
    pub reason: String,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    pub dispute_id: i64,
    /// The assigned arbitrator applying the verdict
    #[arg(short, long)]
    pub arbitrator: i64,
    /// favor_expert, favor_client or compromise
    #[arg(short, long)]
    pub outcome: String,
    /// The written verdict
    #[arg(short, long)]
    pub text: String,
}

#[derive(Debug, Args)]
pub struct RateArgs {
    pub order_id: String,
    /// The client publishing the rating
    #[arg(short, long)]
    pub client: i64,
    /// 1 to 5 stars
    #[arg(short, long)]
    pub rating: i64,
    #[arg(long)]
    pub comment: Option<String>,
}

#[derive(Debug, Args)]
pub struct QualifyArgs {
    pub expert_id: i64,
    pub subject: String,
    #[arg(short, long, default_value_t = 0)]
    pub years: i64,
    /// Hourly rate in dollars
    #[arg(long, default_value_t = 0.0)]
    pub rate: f64,
    /// Mark the specialization as verified
    #[arg(short, long)]
    pub verified: bool,
}

fn dollars(amount: f64) -> Money {
    Money::from_cents((amount * 100.0).round() as i64)
}

pub async fn init_database() -> Result<()> {
    use work_broker_engine::db::sqlite;
    let url = sqlite::db_url();
    sqlite::create_database(&url).await?;
    let db = SqliteDatabase::new_with_url(&url, 5).await?;
    sqlite::run_migrations(db.pool()).await?;
    println!("Database ready at {url}.");
    Ok(())
}

fn actor_for(role: &str, id: i64) -> Result<Actor> {
    let role: Role = role.parse().map_err(|e| anyhow!("{e}"))?;
    Ok(match role {
        Role::System => Actor::system(),
        role => Actor::new(id, [role]),
    })
}

pub async fn create_order(db: &SqliteDatabase, args: NewOrderArgs) -> Result<()> {
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let work_type: WorkType = args.work_type.parse().map_err(|e| anyhow!("{e}"))?;
    let mut order = NewOrder::new(
        OrderId::from(args.order_id),
        args.client,
        dollars(args.budget),
        Utc::now() + Duration::days(args.deadline_days),
    )
    .with_work_type(work_type)
    .with_complexity(args.complexity);
    if let Some(subject) = args.subject {
        order = order.with_subject(subject);
    }
    let order = api.process_new_order(order).await?;
    info!("Order {} created", order.order_id);
    print_orders(&[order], false);
    Ok(())
}

pub async fn show_order(db: &SqliteDatabase, order_id: &str, json: bool) -> Result<()> {
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = api.fetch_order(&OrderId::from(order_id.to_string())).await?;
    print_orders(&[order], json);
    Ok(())
}

pub async fn list_orders(db: &SqliteDatabase, args: OrdersArgs) -> Result<()> {
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let mut filter = OrderQueryFilter::default();
    if let Some(client) = args.client {
        filter = filter.with_client_id(client);
    }
    if let Some(expert) = args.expert {
        filter = filter.with_expert_id(expert);
    }
    if let Some(status) = args.status {
        let status: OrderStatusType = status.parse().map_err(|e| anyhow!("{e}"))?;
        filter = filter.with_status(status);
    }
    let orders = api.search_orders(filter).await?;
    print_orders(&orders, args.json);
    Ok(())
}

pub async fn list_candidates(db: &SqliteDatabase, order_id: &str, limit: Option<usize>, json: bool) -> Result<()> {
    let api = AssignmentApi::new(db.clone(), EventProducers::default());
    let candidates = api.find_candidates(&OrderId::from(order_id.to_string()), limit).await?;
    print_candidates(&candidates, json);
    Ok(())
}

pub async fn take_order(db: &SqliteDatabase, order_id: &str, expert_id: i64) -> Result<()> {
    let api = AssignmentApi::new(db.clone(), EventProducers::default());
    let order = api.take_order(&OrderId::from(order_id.to_string()), expert_id).await?;
    info!("Order {} assigned to expert #{expert_id}", order.order_id);
    print_orders(&[order], false);
    Ok(())
}

pub async fn transition_order(db: &SqliteDatabase, args: TransitionArgs) -> Result<()> {
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let event: OrderEvent = args.event.parse().map_err(|e| anyhow!("{e}"))?;
    let actor = actor_for(&args.role, args.actor)?;
    let order = api.transition_order(&OrderId::from(args.order_id), event, &actor).await?;
    info!("Order {} is now {}", order.order_id, order.status);
    print_orders(&[order], false);
    Ok(())
}

pub async fn expire_orders(db: &SqliteDatabase) -> Result<()> {
    let api = OrderFlowApi::new(db.clone(), EventProducers::default());
    let expired = api.expire_overdue_orders().await?;
    println!("{} overdue orders cancelled.", expired.len());
    if !expired.is_empty() {
        print_orders(&expired, false);
    }
    Ok(())
}

fn dispute_api(db: &SqliteDatabase) -> DisputeApi<SqliteDatabase, LoggingPaymentGateway> {
    DisputeApi::new(
        db.clone(),
        EventProducers::default(),
        CompensationPolicy::from_env_or_default(),
        LoggingPaymentGateway,
    )
}

pub async fn open_dispute(db: &SqliteDatabase, args: DisputeArgs) -> Result<()> {
    let api = dispute_api(db);
    let actor = actor_for(&args.role, args.actor)?;
    let dispute = api.open_dispute(&OrderId::from(args.order_id), &actor, &args.reason).await?;
    print_dispute(&dispute);
    Ok(())
}

pub async fn assign_arbitrator(db: &SqliteDatabase, dispute_id: i64, arbitrator_id: i64) -> Result<()> {
    let api = dispute_api(db);
    let dispute = api.assign_arbitrator(dispute_id, arbitrator_id).await?;
    print_dispute(&dispute);
    Ok(())
}

pub async fn resolve_dispute(db: &SqliteDatabase, args: ResolveArgs) -> Result<()> {
    let api = dispute_api(db);
    let outcome: DisputeOutcome = args.outcome.parse().map_err(|e| anyhow!("{e}"))?;
    let dispute =
        api.resolve_dispute(args.dispute_id, &Actor::arbitrator(args.arbitrator), outcome, &args.text).await?;
    print_dispute(&dispute);
    Ok(())
}

pub async fn rate_order(db: &SqliteDatabase, args: RateArgs) -> Result<()> {
    let api = StatisticsApi::new(db.clone());
    let rating =
        api.rate_order(&OrderId::from(args.order_id), &Actor::client(args.client), args.rating, args.comment).await?;
    println!("Order {} rated {}/5.", rating.order_id, rating.rating);
    Ok(())
}

pub async fn show_stats(db: &SqliteDatabase, expert_id: i64, rebuild: bool, json: bool) -> Result<()> {
    let api = StatisticsApi::new(db.clone());
    let stats = if rebuild {
        Some(api.recompute(expert_id).await?)
    } else {
        api.statistics(expert_id).await?
    };
    match stats {
        Some(stats) => print_statistics(&stats, json),
        None => println!("No statistics for expert #{expert_id} yet. Run with --rebuild to compute them."),
    }
    Ok(())
}

pub async fn qualify_expert(db: &SqliteDatabase, args: QualifyArgs) -> Result<()> {
    let api = StatisticsApi::new(db.clone());
    let mut spec = NewSpecialization::new(args.expert_id, args.subject)
        .with_experience(args.years)
        .with_hourly_rate(dollars(args.rate));
    if args.verified {
        spec = spec.verified();
    }
    let spec = api.upsert_specialization(spec).await?;
    println!(
        "Expert #{} {} for {} ({} years, {}/h).",
        spec.expert_id,
        if spec.is_verified { "verified" } else { "recorded (unverified)" },
        spec.subject,
        spec.experience_years,
        spec.hourly_rate
    );
    Ok(())
}
