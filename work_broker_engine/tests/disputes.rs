use std::sync::{Arc, Mutex};

use ewb_common::Money;
use work_broker_engine::{
    broker_api::dispute_api::CompensationError,
    db_types::{DisputeOutcome, OrderId, OrderStatusType},
    events::EventProducers,
    Actor,
    AssignmentApi,
    BrokerError,
    CompensationPolicy,
    DisputeApi,
    OrderEvent,
    OrderFlowApi,
    PaymentGateway,
    SqliteDatabase,
    StatisticsApi,
};

mod support;
use support::{math_order, seed_expert, setup_db, tear_down};

const CLIENT: i64 = 42;
const EXPERT: i64 = 5;
const ARBITRATOR: i64 = 99;

/// Captures every compensation instruction so tests can assert on what the payment collaborator was told.
#[derive(Default, Clone)]
struct RecordingGateway {
    calls: Arc<Mutex<Vec<(String, u8)>>>,
}

impl RecordingGateway {
    fn calls(&self) -> Vec<(String, u8)> {
        self.calls.lock().unwrap().clone()
    }
}

impl PaymentGateway for RecordingGateway {
    async fn instruct_compensation(&self, order_id: &OrderId, percentage: u8) -> Result<(), CompensationError> {
        self.calls.lock().unwrap().push((order_id.as_str().to_string(), percentage));
        Ok(())
    }
}

fn dispute_api(db: &SqliteDatabase, gateway: RecordingGateway, policy: CompensationPolicy) -> DisputeApi<SqliteDatabase, RecordingGateway> {
    DisputeApi::new(db.clone(), EventProducers::default(), policy, gateway)
}

async fn order_in_review(db: &SqliteDatabase, order_id: &str) -> OrderId {
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let assignments = AssignmentApi::new(db.clone(), EventProducers::default());
    let order = orders.process_new_order(math_order(order_id, CLIENT, 80)).await.unwrap();
    assignments.take_order(&order.order_id, EXPERT).await.unwrap();
    orders.transition_order(&order.order_id, OrderEvent::Submitted, &Actor::expert(EXPERT)).await.unwrap();
    order.order_id
}

/// The full arbitration walk: an order under review is disputed, the arbitrator finds for the client, the order
/// cancels and the full refund is handed to the payment collaborator.
#[tokio::test]
async fn favor_client_cancels_and_instructs_full_refund() {
    let db = setup_db().await;
    seed_expert(&db, EXPERT, "Mathematics", 3).await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let gateway = RecordingGateway::default();
    let disputes = dispute_api(&db, gateway.clone(), CompensationPolicy::default());

    let order_id = order_in_review(&db, "order-7001").await;
    let dispute = disputes.open_dispute(&order_id, &Actor::client(CLIENT), "The sources are fabricated").await.unwrap();
    assert!(!dispute.resolved);
    assert_eq!(orders.fetch_order(&order_id).await.unwrap().status, OrderStatusType::Disputed);

    // Exclusivity: the expert cannot open a second dispute while this one is unresolved.
    match disputes.open_dispute(&order_id, &Actor::expert(EXPERT), "Counter-claim").await {
        Err(BrokerError::DisputeAlreadyExists(_)) => {},
        other => panic!("Expected DisputeAlreadyExists, got {other:?}"),
    }
    // No resolution before an arbitrator is assigned.
    match disputes.resolve_dispute(dispute.id, &Actor::arbitrator(ARBITRATOR), DisputeOutcome::FavorClient, "refund").await
    {
        Err(BrokerError::InvalidTransition(_)) => {},
        other => panic!("Expected InvalidTransition, got {other:?}"),
    }

    let assigned = disputes.assign_arbitrator(dispute.id, ARBITRATOR).await.unwrap();
    assert_eq!(assigned.arbitrator_id, Some(ARBITRATOR));
    // Re-assigning the same arbitrator is a no-op; a different one is refused.
    disputes.assign_arbitrator(dispute.id, ARBITRATOR).await.unwrap();
    match disputes.assign_arbitrator(dispute.id, ARBITRATOR + 1).await {
        Err(BrokerError::InvalidTransition(_)) => {},
        other => panic!("Expected InvalidTransition, got {other:?}"),
    }
    // Only the assigned arbitrator resolves.
    match disputes.resolve_dispute(dispute.id, &Actor::arbitrator(ARBITRATOR + 1), DisputeOutcome::FavorClient, "x").await
    {
        Err(BrokerError::PermissionDenied(_)) => {},
        other => panic!("Expected PermissionDenied, got {other:?}"),
    }

    let resolved = disputes
        .resolve_dispute(dispute.id, &Actor::arbitrator(ARBITRATOR), DisputeOutcome::FavorClient, "Refund the client")
        .await
        .unwrap();
    assert!(resolved.resolved);
    assert_eq!(resolved.outcome, Some(DisputeOutcome::FavorClient));
    assert_eq!(orders.fetch_order(&order_id).await.unwrap().status, OrderStatusType::Cancelled);
    assert_eq!(gateway.calls(), vec![("order-7001".to_string(), 100)]);

    // Re-resolving is refused.
    match disputes.resolve_dispute(dispute.id, &Actor::arbitrator(ARBITRATOR), DisputeOutcome::Compromise, "again").await
    {
        Err(BrokerError::InvalidTransition(_)) => {},
        other => panic!("Expected InvalidTransition, got {other:?}"),
    }

    // The one-unresolved-dispute constraint releases once the dispute is resolved: a fresh row for the same
    // order is accepted at the storage level (reachable again once an order re-enters an active state).
    sqlx::query("INSERT INTO disputes (order_id, raised_by, reason) VALUES ($1, $2, $3)")
        .bind("order-7001")
        .bind(CLIENT)
        .bind("fresh episode")
        .execute(db.pool())
        .await
        .expect("A resolved dispute must not block a new one");
    tear_down(db).await;
}

#[tokio::test]
async fn favor_expert_completes_the_order_without_compensation() {
    let db = setup_db().await;
    seed_expert(&db, EXPERT, "Mathematics", 3).await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let stats = StatisticsApi::new(db.clone());
    let gateway = RecordingGateway::default();
    let disputes = dispute_api(&db, gateway.clone(), CompensationPolicy::default());

    let order_id = order_in_review(&db, "order-7101").await;
    // This time the expert raises the conflict.
    let dispute = disputes.open_dispute(&order_id, &Actor::expert(EXPERT), "Client refuses to review").await.unwrap();
    disputes.assign_arbitrator(dispute.id, ARBITRATOR).await.unwrap();
    disputes
        .resolve_dispute(dispute.id, &Actor::arbitrator(ARBITRATOR), DisputeOutcome::FavorExpert, "Work is sound")
        .await
        .unwrap();

    let order = orders.fetch_order(&order_id).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Completed);
    assert_eq!(order.final_price, Some(Money::from_dollars(80)));
    // favor_expert refunds nothing, so the payment collaborator hears nothing.
    assert!(gateway.calls().is_empty());
    let s = stats.statistics(EXPERT).await.unwrap().unwrap();
    assert_eq!(s.completed_orders, 1);
    assert_eq!(s.total_earnings, Money::from_dollars(80));
    tear_down(db).await;
}

#[tokio::test]
async fn compromise_uses_the_configured_percentage() {
    let db = setup_db().await;
    seed_expert(&db, EXPERT, "Mathematics", 3).await;
    let gateway = RecordingGateway::default();
    let policy = CompensationPolicy { favor_expert: 0, favor_client: 100, compromise: 30 };
    let disputes = dispute_api(&db, gateway.clone(), policy);

    let order_id = order_in_review(&db, "order-7201").await;
    let dispute = disputes.open_dispute(&order_id, &Actor::client(CLIENT), "Half the brief is missing").await.unwrap();
    disputes.assign_arbitrator(dispute.id, ARBITRATOR).await.unwrap();
    disputes
        .resolve_dispute(dispute.id, &Actor::arbitrator(ARBITRATOR), DisputeOutcome::Compromise, "Split the cost")
        .await
        .unwrap();
    assert_eq!(gateway.calls(), vec![("order-7201".to_string(), 30)]);

    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    assert_eq!(orders.fetch_order(&order_id).await.unwrap().status, OrderStatusType::Cancelled);
    tear_down(db).await;
}

#[tokio::test]
async fn disputes_require_an_active_order_and_a_party_to_it() {
    let db = setup_db().await;
    seed_expert(&db, EXPERT, "Mathematics", 3).await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let disputes = dispute_api(&db, RecordingGateway::default(), CompensationPolicy::default());

    // An order that is still new has nothing to arbitrate.
    let fresh = orders.process_new_order(math_order("order-7301", CLIENT, 60)).await.unwrap();
    match disputes.open_dispute(&fresh.order_id, &Actor::client(CLIENT), "too slow").await {
        Err(BrokerError::InvalidTransition(_)) => {},
        other => panic!("Expected InvalidTransition, got {other:?}"),
    }

    // Bystanders cannot dispute an active order.
    let order_id = order_in_review(&db, "order-7302").await;
    match disputes.open_dispute(&order_id, &Actor::client(CLIENT + 1), "not my order").await {
        Err(BrokerError::PermissionDenied(_)) => {},
        other => panic!("Expected PermissionDenied, got {other:?}"),
    }
    match disputes.open_dispute(&order_id, &Actor::expert(EXPERT + 1), "not my order").await {
        Err(BrokerError::PermissionDenied(_)) => {},
        other => panic!("Expected PermissionDenied, got {other:?}"),
    }
    match disputes.resolve_dispute(404, &Actor::arbitrator(ARBITRATOR), DisputeOutcome::FavorClient, "x").await {
        Err(BrokerError::DisputeNotFound(404)) => {},
        other => panic!("Expected DisputeNotFound, got {other:?}"),
    }
    tear_down(db).await;
}
