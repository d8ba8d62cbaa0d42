use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db::common::BrokerError,
    db_types::{ExpertRating, NewRating},
};

/// Stores a rating. The UNIQUE index on `order_id` guarantees at most one rating per order; violating it maps to
/// [`BrokerError::RatingAlreadyExists`].
pub(crate) async fn insert_rating(rating: NewRating, conn: &mut SqliteConnection) -> Result<ExpertRating, BrokerError> {
    let result = sqlx::query_as(
        "INSERT INTO expert_ratings (expert_id, client_id, order_id, rating, comment) VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(rating.expert_id)
    .bind(rating.client_id)
    .bind(rating.order_id.as_str())
    .bind(rating.rating)
    .bind(rating.comment.clone())
    .fetch_one(conn)
    .await;
    match result {
        Ok(row) => {
            debug!("⭐️ Order {} rated {} by client #{}", rating.order_id, rating.rating, rating.client_id);
            Ok(row)
        },
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(BrokerError::RatingAlreadyExists(rating.order_id))
        },
        Err(e) => Err(e.into()),
    }
}

