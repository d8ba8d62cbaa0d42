use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    broker_api::order_objects::OrderQueryFilter,
    db::common::BrokerError,
    db_types::{NewOrder, Order, OrderId, OrderStatusType},
};

/// Inserts the order into the database, returning `false` in the second parameter if the order already exists.
pub async fn idempotent_insert(order: NewOrder, conn: &mut SqliteConnection) -> Result<(Order, bool), BrokerError> {
    let inserted = match fetch_order_by_order_id(&order.order_id, conn).await? {
        Some(order) => (order, false),
        None => {
            let order = insert_order(order, conn).await?;
            debug!("📝️ Order [{}] inserted with id {}", order.order_id, order.id);
            (order, true)
        },
    };
    Ok(inserted)
}

async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, BrokerError> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                client_id,
                subject,
                work_type,
                complexity,
                budget,
                deadline
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.client_id)
    .bind(order.subject)
    .bind(order.work_type)
    .bind(order.complexity)
    .bind(order.budget)
    .bind(order.deadline)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Returns the entry in the orders table for the corresponding `order_id`
pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in ascending order
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new(
        r#"
    SELECT * FROM orders
    "#,
    );
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_id) = query.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.to_string());
    }
    if let Some(client_id) = query.client_id {
        where_clause.push("client_id = ");
        where_clause.push_bind_unseparated(client_id);
    }
    if let Some(expert_id) = query.expert_id {
        where_clause.push("expert_id = ");
        where_clause.push_bind_unseparated(expert_id);
    }
    if let Some(subject) = query.subject {
        where_clause.push("subject = ");
        where_clause.push_bind_unseparated(subject);
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let mut statuses = vec![];
        query.status.as_ref().unwrap().iter().for_each(|s| {
            statuses.push(format!("'{s}'"));
        });
        let status_clause = statuses.join(",");
        where_clause.push(format!("status IN ({status_clause})"));
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");

    trace!("📝️ Executing query: {}", builder.sql());
    let query = builder.build_query_as::<Order>();
    let orders = query.fetch_all(conn).await?;
    trace!("📝️ Result of search_orders: {:?}", orders.len());
    Ok(orders)
}

/// The atomic claim. Succeeds only while the order is still `new` and unassigned; `None` means another claimant
/// got there first or the order left the open state.
pub(crate) async fn claim_order(
    order_id: &OrderId,
    expert_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, BrokerError> {
    let result: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders
           SET expert_id = $1,
               status = 'in_progress',
               assigned_at = CURRENT_TIMESTAMP,
               updated_at = CURRENT_TIMESTAMP
         WHERE order_id = $2 AND status = 'new' AND expert_id IS NULL
        RETURNING *
        "#,
    )
    .bind(expert_id)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Conditionally moves the order from `from` to `to`. `None` means the order was no longer in `from`.
pub(crate) async fn update_order_status_checked(
    order_id: &OrderId,
    from: OrderStatusType,
    to: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, BrokerError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 AND status = $3 \
         RETURNING *",
    )
    .bind(to)
    .bind(order_id.as_str())
    .bind(from)
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Terminal completion. Fixes the final price at the same instant the status flips so a completed order is never
/// observed without one.
pub(crate) async fn complete_order_checked(
    order_id: &OrderId,
    from: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, BrokerError> {
    let result: Option<Order> = sqlx::query_as(
        r#"
        UPDATE orders
           SET status = 'completed',
               final_price = COALESCE(final_price, budget),
               updated_at = CURRENT_TIMESTAMP
         WHERE order_id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(order_id.as_str())
    .bind(from)
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Cancels every `new` order whose deadline has passed. Re-running is a no-op for rows already cancelled.
pub(crate) async fn expire_overdue(conn: &mut SqliteConnection) -> Result<Vec<Order>, BrokerError> {
    let rows = sqlx::query_as(
        "UPDATE orders SET status = 'cancelled', updated_at = CURRENT_TIMESTAMP WHERE status = 'new' AND \
         unixepoch(deadline) <= unixepoch(CURRENT_TIMESTAMP) RETURNING *;",
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

/// Count of the expert's orders currently being worked: the workload the matching cap is measured against.
pub(crate) async fn active_order_count(expert_id: i64, conn: &mut SqliteConnection) -> Result<i64, BrokerError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE expert_id = $1 AND status IN ('in_progress', 'revision')",
    )
    .bind(expert_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}
