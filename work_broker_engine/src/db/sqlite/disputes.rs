use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db::common::BrokerError,
    db_types::{Dispute, DisputeOutcome, OrderId},
};

/// Creates the dispute row. The partial unique index on unresolved disputes turns a concurrent second open into a
/// unique violation, which maps to [`BrokerError::DisputeAlreadyExists`].
pub(crate) async fn insert_dispute(
    order_id: &OrderId,
    raised_by: i64,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<Dispute, BrokerError> {
    let result = sqlx::query_as("INSERT INTO disputes (order_id, raised_by, reason) VALUES ($1, $2, $3) RETURNING *")
        .bind(order_id.as_str())
        .bind(raised_by)
        .bind(reason)
        .fetch_one(conn)
        .await;
    match result {
        Ok(dispute) => {
            debug!("⚖️ Dispute opened on order {order_id} by #{raised_by}");
            Ok(dispute)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(BrokerError::DisputeAlreadyExists(order_id.clone()))
        },
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn fetch_dispute(dispute_id: i64, conn: &mut SqliteConnection) -> Result<Option<Dispute>, BrokerError> {
    let dispute = sqlx::query_as("SELECT * FROM disputes WHERE id = $1").bind(dispute_id).fetch_optional(conn).await?;
    Ok(dispute)
}

pub(crate) async fn fetch_open_dispute(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, BrokerError> {
    let dispute = sqlx::query_as("SELECT * FROM disputes WHERE order_id = $1 AND resolved = 0")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(dispute)
}

/// Sets the arbitrator on an unresolved dispute. The condition admits re-assigning the same arbitrator, making the
/// call idempotent; `None` means the dispute is resolved, missing, or held by a different arbitrator.
pub(crate) async fn assign_arbitrator(
    dispute_id: i64,
    arbitrator_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, BrokerError> {
    let dispute: Option<Dispute> = sqlx::query_as(
        "UPDATE disputes SET arbitrator_id = $1 WHERE id = $2 AND resolved = 0 AND (arbitrator_id IS NULL OR \
         arbitrator_id = $1) RETURNING *",
    )
    .bind(arbitrator_id)
    .bind(dispute_id)
    .fetch_optional(conn)
    .await?;
    Ok(dispute)
}

/// Marks the dispute resolved. `None` means it was already resolved (or does not exist); the caller distinguishes
/// the two.
pub(crate) async fn resolve_dispute_checked(
    dispute_id: i64,
    outcome: DisputeOutcome,
    result_text: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, BrokerError> {
    let dispute: Option<Dispute> = sqlx::query_as(
        "UPDATE disputes SET resolved = 1, outcome = $1, result_text = $2, resolved_at = CURRENT_TIMESTAMP WHERE \
         id = $3 AND resolved = 0 RETURNING *",
    )
    .bind(outcome)
    .bind(result_text)
    .bind(dispute_id)
    .fetch_optional(conn)
    .await?;
    Ok(dispute)
}
