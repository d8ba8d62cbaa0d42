use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db::common::BrokerError,
    db_types::{ExpertCandidate, NewSpecialization, Specialization},
};

pub(crate) async fn upsert_specialization(
    spec: NewSpecialization,
    conn: &mut SqliteConnection,
) -> Result<Specialization, BrokerError> {
    let row: Specialization = sqlx::query_as(
        r#"
        INSERT INTO specializations (expert_id, subject, experience_years, hourly_rate, is_verified)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (expert_id, subject) DO UPDATE SET
            experience_years = excluded.experience_years,
            hourly_rate = excluded.hourly_rate,
            is_verified = excluded.is_verified
        RETURNING *
        "#,
    )
    .bind(spec.expert_id)
    .bind(spec.subject)
    .bind(spec.experience_years)
    .bind(spec.hourly_rate)
    .bind(spec.is_verified)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub(crate) async fn verified_specialization_exists(
    expert_id: i64,
    subject: &str,
    conn: &mut SqliteConnection,
) -> Result<bool, BrokerError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM specializations WHERE expert_id = $1 AND subject = $2 AND is_verified = 1",
    )
    .bind(expert_id)
    .bind(subject)
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

/// One row per expert holding a verified specialization for `subject` (any verified specialization when no
/// subject is given), joined with their stored aggregates and current active-order count. Experts without a
/// statistics row yet default to zeroed aggregates.
pub(crate) async fn candidate_snapshot(
    subject: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Vec<ExpertCandidate>, BrokerError> {
    let rows: Vec<ExpertCandidate> = sqlx::query_as(
        r#"
        SELECT s.expert_id AS expert_id,
               COALESCE(st.average_rating, 0) AS avg_rating,
               COALESCE(st.success_rate, 0) AS success_rate,
               MAX(s.experience_years) AS experience_years,
               COALESCE(w.active, 0) AS workload
          FROM specializations s
          LEFT JOIN expert_statistics st ON st.expert_id = s.expert_id
          LEFT JOIN (
                SELECT expert_id, COUNT(*) AS active
                  FROM orders
                 WHERE status IN ('in_progress', 'revision')
                 GROUP BY expert_id
               ) w ON w.expert_id = s.expert_id
         WHERE s.is_verified = 1 AND ($1 IS NULL OR s.subject = $1)
         GROUP BY s.expert_id
        "#,
    )
    .bind(subject)
    .fetch_all(conn)
    .await?;
    trace!("🎯️ Candidate snapshot returned {} experts", rows.len());
    Ok(rows)
}
