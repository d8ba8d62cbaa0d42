use ewb_common::Money;
use work_broker_engine::{
    db_types::{ExpertStatistics, OrderId, OrderStatusType},
    events::EventProducers,
    Actor,
    AssignmentApi,
    BrokerError,
    OrderEvent,
    OrderFlowApi,
    SqliteDatabase,
    StatisticsApi,
};

mod support;
use support::{math_order, seed_expert, setup_db, tear_down};

const CLIENT: i64 = 42;
const EXPERT: i64 = 21;

async fn complete_order(db: &SqliteDatabase, order_id: &str, budget_dollars: i64) -> OrderId {
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let assignments = AssignmentApi::new(db.clone(), EventProducers::default());
    let order = orders.process_new_order(math_order(order_id, CLIENT, budget_dollars)).await.unwrap();
    assignments.take_order(&order.order_id, EXPERT).await.unwrap();
    orders.transition_order(&order.order_id, OrderEvent::Submitted, &Actor::expert(EXPERT)).await.unwrap();
    orders.transition_order(&order.order_id, OrderEvent::Accepted, &Actor::client(CLIENT)).await.unwrap();
    order.order_id
}

fn assert_same_aggregates(a: &ExpertStatistics, b: &ExpertStatistics) {
    assert_eq!(a.expert_id, b.expert_id);
    assert_eq!(a.total_orders, b.total_orders);
    assert_eq!(a.completed_orders, b.completed_orders);
    assert_eq!(a.average_rating, b.average_rating);
    assert_eq!(a.success_rate, b.success_rate);
    assert_eq!(a.total_earnings, b.total_earnings);
    assert_eq!(a.response_time_avg, b.response_time_avg);
}

#[tokio::test]
async fn recompute_is_idempotent_and_ratings_are_unique() {
    let db = setup_db().await;
    seed_expert(&db, EXPERT, "Mathematics", 5).await;
    let stats = StatisticsApi::new(db.clone());
    let order_id = complete_order(&db, "order-9001", 110).await;

    let rating = stats.rate_order(&order_id, &Actor::client(CLIENT), 5, Some("Flawless".to_string())).await.unwrap();
    assert_eq!(rating.rating, 5);
    assert_eq!(rating.expert_id, EXPERT);

    // Exactly one rating per completed order.
    match stats.rate_order(&order_id, &Actor::client(CLIENT), 4, None).await {
        Err(BrokerError::RatingAlreadyExists(_)) => {},
        other => panic!("Expected RatingAlreadyExists, got {other:?}"),
    }

    let first = stats.recompute(EXPERT).await.unwrap();
    assert_eq!(first.total_orders, 1);
    assert_eq!(first.completed_orders, 1);
    assert!((first.average_rating - 5.0).abs() < f64::EPSILON);
    assert!((first.success_rate - 100.0).abs() < f64::EPSILON);
    assert_eq!(first.total_earnings, Money::from_dollars(110));
    assert!(first.response_time_avg.is_some());

    // Back-to-back recomputes with no intervening writes agree on every field.
    let second = stats.recompute(EXPERT).await.unwrap();
    assert_same_aggregates(&first, &second);

    // A second, still-active order halves the success rate but adds no earnings.
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let assignments = AssignmentApi::new(db.clone(), EventProducers::default());
    let active = orders.process_new_order(math_order("order-9002", CLIENT, 70)).await.unwrap();
    assignments.take_order(&active.order_id, EXPERT).await.unwrap();
    let third = stats.recompute(EXPERT).await.unwrap();
    assert_eq!(third.total_orders, 2);
    assert_eq!(third.completed_orders, 1);
    assert!((third.success_rate - 50.0).abs() < f64::EPSILON);
    assert_eq!(third.total_earnings, Money::from_dollars(110));
    tear_down(db).await;
}

#[tokio::test]
async fn rating_guards() {
    let db = setup_db().await;
    seed_expert(&db, EXPERT, "Mathematics", 5).await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let assignments = AssignmentApi::new(db.clone(), EventProducers::default());
    let stats = StatisticsApi::new(db.clone());

    let order = orders.process_new_order(math_order("order-9101", CLIENT, 50)).await.unwrap();
    assignments.take_order(&order.order_id, EXPERT).await.unwrap();

    // The order is still being worked; there is nothing to rate yet.
    match stats.rate_order(&order.order_id, &Actor::client(CLIENT), 5, None).await {
        Err(BrokerError::OrderNotCompleted(_)) => {},
        other => panic!("Expected OrderNotCompleted, got {other:?}"),
    }

    let completed = complete_order(&db, "order-9102", 50).await;
    for invalid in [0, 6, -1] {
        match stats.rate_order(&completed, &Actor::client(CLIENT), invalid, None).await {
            Err(BrokerError::InvalidRating(r)) => assert_eq!(r, invalid),
            other => panic!("Expected InvalidRating, got {other:?}"),
        }
    }
    match stats.rate_order(&completed, &Actor::client(CLIENT + 1), 3, None).await {
        Err(BrokerError::PermissionDenied(_)) => {},
        other => panic!("Expected PermissionDenied, got {other:?}"),
    }
    match stats.rate_order(&OrderId::from("no-such-order".to_string()), &Actor::client(CLIENT), 3, None).await {
        Err(BrokerError::OrderNotFound(_)) => {},
        other => panic!("Expected OrderNotFound, got {other:?}"),
    }
    tear_down(db).await;
}

#[tokio::test]
async fn statistics_for_an_unknown_expert_are_empty() {
    let db = setup_db().await;
    let stats = StatisticsApi::new(db.clone());
    assert!(stats.statistics(404).await.unwrap().is_none());
    // Recomputing an expert with no history is legal and yields a zeroed row.
    let s = stats.recompute(404).await.unwrap();
    assert_eq!(s.total_orders, 0);
    assert_eq!(s.completed_orders, 0);
    assert_eq!(s.average_rating, 0.0);
    assert_eq!(s.success_rate, 0.0);
    assert_eq!(s.total_earnings, Money::default());
    assert!(s.response_time_avg.is_none());
    tear_down(db).await;
}

#[tokio::test]
async fn cancelled_orders_count_against_the_success_rate() {
    let db = setup_db().await;
    seed_expert(&db, EXPERT, "Mathematics", 5).await;
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default());
    let assignments = AssignmentApi::new(db.clone(), EventProducers::default());
    let stats = StatisticsApi::new(db.clone());

    complete_order(&db, "order-9201", 100).await;
    // A dispute-style cancellation: claim, then force the terminal state through the storage layer.
    let lost = orders.process_new_order(math_order("order-9202", CLIENT, 100)).await.unwrap();
    assignments.take_order(&lost.order_id, EXPERT).await.unwrap();
    sqlx::query("UPDATE orders SET status = 'cancelled' WHERE order_id = $1")
        .bind("order-9202")
        .execute(db.pool())
        .await
        .unwrap();

    let s = stats.recompute(EXPERT).await.unwrap();
    assert_eq!(s.total_orders, 2);
    assert_eq!(s.completed_orders, 1);
    assert!((s.success_rate - 50.0).abs() < f64::EPSILON);
    assert_eq!(s.total_earnings, Money::from_dollars(100));
    tear_down(db).await;
}
