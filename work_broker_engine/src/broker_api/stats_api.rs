use std::fmt::Debug;

use log::*;

use crate::{
    db::common::{BrokerDatabase, BrokerError, ExpertManagement},
    db_types::{ExpertRating, ExpertStatistics, NewRating, NewSpecialization, OrderId, OrderStatusType, Specialization},
    lifecycle::{Actor, Role},
};

/// Expert statistics and ratings. Statistics are derived data: this API only ever rebuilds them from the order
/// and rating rows, so any call can be repeated or reordered without changing the result.
pub struct StatisticsApi<B> {
    db: B,
}

impl<B> Debug for StatisticsApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StatisticsApi")
    }
}

impl<B> StatisticsApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> StatisticsApi<B>
where B: BrokerDatabase + ExpertManagement
{
    pub async fn recompute(&self, expert_id: i64) -> Result<ExpertStatistics, BrokerError> {
        self.db.recompute_statistics(expert_id).await
    }

    pub async fn statistics(&self, expert_id: i64) -> Result<Option<ExpertStatistics>, BrokerError> {
        self.db.fetch_statistics(expert_id).await
    }

    pub async fn upsert_specialization(&self, spec: NewSpecialization) -> Result<Specialization, BrokerError> {
        self.db.upsert_specialization(spec).await
    }

    /// The client of a completed order publishes its rating. Exactly one rating exists per order; a second
    /// attempt fails with [`BrokerError::RatingAlreadyExists`]. A successful write refreshes the expert's
    /// statistics.
    pub async fn rate_order(
        &self,
        order_id: &OrderId,
        actor: &Actor,
        rating: i64,
        comment: Option<String>,
    ) -> Result<ExpertRating, BrokerError> {
        if !(1..=5).contains(&rating) {
            return Err(BrokerError::InvalidRating(rating));
        }
        let order = self
            .db
            .fetch_order(order_id)
            .await?
            .ok_or_else(|| BrokerError::OrderNotFound(order_id.clone()))?;
        if order.status != OrderStatusType::Completed {
            return Err(BrokerError::OrderNotCompleted(order_id.clone()));
        }
        if !actor.has_role(Role::Client) || actor.id() != order.client_id {
            return Err(BrokerError::PermissionDenied(format!(
                "actor #{} is not the client of order {order_id}",
                actor.id()
            )));
        }
        let expert_id = order
            .expert_id
            .ok_or_else(|| BrokerError::UnsupportedAction("Rating an order that was never assigned".to_string()))?;
        let new_rating =
            NewRating { expert_id, client_id: actor.id(), order_id: order.order_id.clone(), rating, comment };
        let stored = self.db.insert_rating(new_rating).await?;
        // The rebuild is idempotent; a failure here only delays the refresh until the next trigger.
        if let Err(e) = self.db.recompute_statistics(expert_id).await {
            warn!("📊️ Statistics refresh for expert #{expert_id} failed and will be retried: {e}");
        }
        Ok(stored)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
