use chrono::{Duration, Utc};
use ewb_common::Money;
use work_broker_engine::{
    db_types::{NewOrder, OrderId, OrderStatusType},
    events::EventProducers,
    Actor,
    AssignmentApi,
    BrokerError,
    OrderEvent,
    OrderFlowApi,
    StatisticsApi,
};

mod support;
use support::{math_order, seed_expert, setup_db, tear_down};

const CLIENT: i64 = 42;
const EXPERT: i64 = 11;

#[tokio::test]
async fn review_cycle_runs_to_completion() {
    let db = setup_db().await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let assignments = AssignmentApi::new(db.clone(), EventProducers::default());
    let stats = StatisticsApi::new(db.clone());
    seed_expert(&db, EXPERT, "Mathematics", 4).await;
    let client = Actor::client(CLIENT);
    let expert = Actor::expert(EXPERT);

    let order = orders.process_new_order(math_order("order-1001", CLIENT, 120)).await.unwrap();
    assignments.take_order(&order.order_id, EXPERT).await.unwrap();

    let order_id = order.order_id.clone();
    let in_review = orders.transition_order(&order_id, OrderEvent::Submitted, &expert).await.unwrap();
    assert_eq!(in_review.status, OrderStatusType::Review);
    let in_revision = orders.transition_order(&order_id, OrderEvent::RevisionRequested, &client).await.unwrap();
    assert_eq!(in_revision.status, OrderStatusType::Revision);
    let back_in_review = orders.transition_order(&order_id, OrderEvent::Resubmitted, &expert).await.unwrap();
    assert_eq!(back_in_review.status, OrderStatusType::Review);
    let done = orders.transition_order(&order_id, OrderEvent::Accepted, &client).await.unwrap();
    assert_eq!(done.status, OrderStatusType::Completed);
    assert_eq!(done.final_price, Some(Money::from_dollars(120)));
    assert!(done.assigned_at.is_some());

    // Completion refreshed the expert's aggregates.
    let s = stats.statistics(EXPERT).await.unwrap().expect("statistics row should exist after completion");
    assert_eq!(s.total_orders, 1);
    assert_eq!(s.completed_orders, 1);
    assert!((s.success_rate - 100.0).abs() < f64::EPSILON);
    assert_eq!(s.total_earnings, Money::from_dollars(120));
    tear_down(db).await;
}

#[tokio::test]
async fn duplicate_order_ids_are_rejected() {
    let db = setup_db().await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    orders.process_new_order(math_order("order-1050", CLIENT, 60)).await.unwrap();
    match orders.process_new_order(math_order("order-1050", CLIENT, 75)).await {
        Err(BrokerError::OrderAlreadyExists(_)) => {},
        other => panic!("Expected OrderAlreadyExists, got {other:?}"),
    }
    tear_down(db).await;
}

#[tokio::test]
async fn transitions_enforce_table_and_actor_identity() {
    let db = setup_db().await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let assignments = AssignmentApi::new(db.clone(), EventProducers::default());
    seed_expert(&db, EXPERT, "Mathematics", 4).await;

    let order = orders.process_new_order(math_order("order-1101", CLIENT, 90)).await.unwrap();
    let order_id = order.order_id.clone();

    // Accepting an order that is still new is outside the table.
    match orders.transition_order(&order_id, OrderEvent::Accepted, &Actor::client(CLIENT)).await {
        Err(BrokerError::InvalidTransition(_)) => {},
        other => panic!("Expected InvalidTransition, got {other:?}"),
    }
    // Claims may not come through the generic entry point.
    match orders.transition_order(&order_id, OrderEvent::Claimed, &Actor::expert(EXPERT)).await {
        Err(BrokerError::UnsupportedAction(_)) => {},
        other => panic!("Expected UnsupportedAction, got {other:?}"),
    }

    assignments.take_order(&order_id, EXPERT).await.unwrap();

    // Only the assigned expert submits.
    match orders.transition_order(&order_id, OrderEvent::Submitted, &Actor::expert(99)).await {
        Err(BrokerError::PermissionDenied(_)) => {},
        other => panic!("Expected PermissionDenied, got {other:?}"),
    }
    orders.transition_order(&order_id, OrderEvent::Submitted, &Actor::expert(EXPERT)).await.unwrap();

    // Only the order's client accepts, and a client cannot fire expert events.
    match orders.transition_order(&order_id, OrderEvent::Accepted, &Actor::client(77)).await {
        Err(BrokerError::PermissionDenied(_)) => {},
        other => panic!("Expected PermissionDenied, got {other:?}"),
    }
    match orders.transition_order(&order_id, OrderEvent::Resubmitted, &Actor::client(CLIENT)).await {
        Err(BrokerError::PermissionDenied(_)) => {},
        other => panic!("Expected PermissionDenied, got {other:?}"),
    }

    // A failed transition leaves the order where it was.
    let untouched = orders.fetch_order(&order_id).await.unwrap();
    assert_eq!(untouched.status, OrderStatusType::Review);

    match orders.transition_order(&OrderId::from("no-such-order".to_string()), OrderEvent::Accepted, &Actor::client(CLIENT)).await
    {
        Err(BrokerError::OrderNotFound(_)) => {},
        other => panic!("Expected OrderNotFound, got {other:?}"),
    }
    tear_down(db).await;
}

#[tokio::test]
async fn payment_detour_reaches_in_progress() {
    let db = setup_db().await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = orders.process_new_order(math_order("order-1201", CLIENT, 200)).await.unwrap();
    let order_id = order.order_id.clone();

    let waiting =
        orders.transition_order(&order_id, OrderEvent::PaymentInitiated, &Actor::client(CLIENT)).await.unwrap();
    assert_eq!(waiting.status, OrderStatusType::WaitingPayment);
    // Confirmation is the system's event, not the client's.
    match orders.transition_order(&order_id, OrderEvent::PaymentConfirmed, &Actor::client(CLIENT)).await {
        Err(BrokerError::PermissionDenied(_)) => {},
        other => panic!("Expected PermissionDenied, got {other:?}"),
    }
    let in_progress =
        orders.transition_order(&order_id, OrderEvent::PaymentConfirmed, &Actor::system()).await.unwrap();
    assert_eq!(in_progress.status, OrderStatusType::InProgress);
    match orders.transition_order(&order_id, OrderEvent::PaymentConfirmed, &Actor::system()).await {
        Err(BrokerError::InvalidTransition(_)) => {},
        other => panic!("Expected InvalidTransition, got {other:?}"),
    }
    tear_down(db).await;
}

#[tokio::test]
async fn deadline_expiry_is_idempotent() {
    let db = setup_db().await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let assignments = AssignmentApi::new(db.clone(), EventProducers::default());
    seed_expert(&db, EXPERT, "Mathematics", 2).await;

    let overdue = NewOrder::new(
        OrderId::from("order-1301".to_string()),
        CLIENT,
        Money::from_dollars(80),
        Utc::now() - Duration::hours(1),
    )
    .with_subject("Mathematics");
    orders.process_new_order(overdue).await.unwrap();
    orders.process_new_order(math_order("order-1302", CLIENT, 80)).await.unwrap();

    let expired = orders.expire_overdue_orders().await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].order_id, OrderId::from("order-1301".to_string()));
    assert_eq!(expired[0].status, OrderStatusType::Cancelled);

    // Re-running is a no-op, not an error.
    assert!(orders.expire_overdue_orders().await.unwrap().is_empty());

    // A cancelled order can no longer be claimed.
    match assignments.take_order(&OrderId::from("order-1301".to_string()), EXPERT).await {
        Err(BrokerError::OrderNotAvailable(_)) => {},
        other => panic!("Expected OrderNotAvailable, got {other:?}"),
    }

    // Clients may still withdraw their own unclaimed orders directly.
    let withdrawn = orders
        .transition_order(&OrderId::from("order-1302".to_string()), OrderEvent::Cancelled, &Actor::client(CLIENT))
        .await
        .unwrap();
    assert_eq!(withdrawn.status, OrderStatusType::Cancelled);
    tear_down(db).await;
}
