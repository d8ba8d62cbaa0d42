use ewb_common::Money;
use sqlx::{FromRow, SqliteConnection};

use crate::{db::common::BrokerError, db_types::ExpertStatistics};

#[derive(Debug, FromRow)]
struct OrderAggregates {
    total: i64,
    completed: i64,
    earnings: Money,
    response: Option<f64>,
}

/// Rebuilds the statistics row for the expert from the order and rating rows.
///
/// Every field is recomputed from scratch and the row rewritten with an upsert, so the call is idempotent and
/// independent of how many partial updates preceded it. The caller wraps this in a transaction so the reads see
/// one consistent snapshot.
pub(crate) async fn recompute(expert_id: i64, conn: &mut SqliteConnection) -> Result<ExpertStatistics, BrokerError> {
    let agg: OrderAggregates = sqlx::query_as(
        r#"
        SELECT COUNT(*) AS total,
               COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed,
               COALESCE(SUM(CASE WHEN status = 'completed' THEN COALESCE(final_price, budget) ELSE 0 END), 0)
                   AS earnings,
               AVG(CASE WHEN assigned_at IS NOT NULL THEN unixepoch(assigned_at) - unixepoch(created_at) END)
                   AS response
          FROM orders
         WHERE expert_id = $1
        "#,
    )
    .bind(expert_id)
    .fetch_one(&mut *conn)
    .await?;
    let avg_rating: Option<f64> = sqlx::query_scalar("SELECT AVG(rating) FROM expert_ratings WHERE expert_id = $1")
        .bind(expert_id)
        .fetch_one(&mut *conn)
        .await?;
    let success_rate = if agg.total > 0 { agg.completed as f64 / agg.total as f64 * 100.0 } else { 0.0 };
    #[allow(clippy::cast_possible_truncation)]
    let response_time_avg = agg.response.map(|secs| secs.round() as i64);
    let stats: ExpertStatistics = sqlx::query_as(
        r#"
        INSERT INTO expert_statistics (
            expert_id, total_orders, completed_orders, average_rating, success_rate, total_earnings,
            response_time_avg, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, CURRENT_TIMESTAMP)
        ON CONFLICT (expert_id) DO UPDATE SET
            total_orders = excluded.total_orders,
            completed_orders = excluded.completed_orders,
            average_rating = excluded.average_rating,
            success_rate = excluded.success_rate,
            total_earnings = excluded.total_earnings,
            response_time_avg = excluded.response_time_avg,
            updated_at = CURRENT_TIMESTAMP
        RETURNING *
        "#,
    )
    .bind(expert_id)
    .bind(agg.total)
    .bind(agg.completed)
    .bind(avg_rating.unwrap_or(0.0))
    .bind(success_rate)
    .bind(agg.earnings)
    .bind(response_time_avg)
    .fetch_one(conn)
    .await?;
    Ok(stats)
}

pub(crate) async fn fetch(
    expert_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<ExpertStatistics>, BrokerError> {
    let stats = sqlx::query_as("SELECT * FROM expert_statistics WHERE expert_id = $1")
        .bind(expert_id)
        .fetch_optional(conn)
        .await?;
    Ok(stats)
}
