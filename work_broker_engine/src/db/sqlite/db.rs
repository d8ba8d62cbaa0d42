use std::fmt::Debug;

use log::*;
use sqlx::SqlitePool;

use super::{db_url, disputes, experts, new_pool, orders, ratings, statistics};
use crate::{
    broker_api::order_objects::OrderQueryFilter,
    db::common::{BrokerDatabase, BrokerError, DisputeManagement, ExpertManagement},
    db_types::{
        Dispute,
        DisputeOutcome,
        ExpertCandidate,
        ExpertRating,
        ExpertStatistics,
        NewOrder,
        NewRating,
        NewSpecialization,
        Order,
        OrderId,
        OrderStatusType,
        Specialization,
    },
    matcher::MAX_ACTIVE_ORDERS,
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the environment.
    pub async fn new() -> Result<Self, BrokerError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), 10).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, BrokerError> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl BrokerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), BrokerError> {
        let mut conn = self.pool.acquire().await?;
        orders::idempotent_insert(order, &mut conn).await
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    /// The eligibility reads here are advisory; the claim itself is the single conditional update in
    /// [`orders::claim_order`], so two racing claimants can never both win no matter how the reads interleave.
    async fn claim_order(&self, order_id: &OrderId, expert_id: i64) -> Result<Order, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn)
            .await?
            .ok_or_else(|| BrokerError::OrderNotFound(order_id.clone()))?;
        if let Some(subject) = order.subject.as_deref() {
            if !experts::verified_specialization_exists(expert_id, subject, &mut conn).await? {
                return Err(BrokerError::ExpertNotQualified { expert_id, subject: subject.to_string() });
            }
        }
        let active = orders::active_order_count(expert_id, &mut conn).await?;
        if active >= MAX_ACTIVE_ORDERS {
            return Err(BrokerError::ExpertOverloaded { expert_id, active });
        }
        match orders::claim_order(order_id, expert_id, &mut conn).await? {
            Some(order) => {
                debug!("🗃️ Order {order_id} claimed by expert #{expert_id}");
                Ok(order)
            },
            None => Err(BrokerError::OrderNotAvailable(order_id.clone())),
        }
    }

    async fn apply_transition(
        &self,
        order_id: &OrderId,
        from: OrderStatusType,
        to: OrderStatusType,
    ) -> Result<Option<Order>, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::update_order_status_checked(order_id, from, to, &mut conn).await?;
        if order.is_some() {
            debug!("🗃️ Order {order_id} moved {from} → {to}");
        }
        Ok(order)
    }

    async fn complete_order(&self, order_id: &OrderId, from: OrderStatusType) -> Result<Option<Order>, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::complete_order_checked(order_id, from, &mut conn).await?;
        if let Some(order) = &order {
            debug!("🗃️ Order {order_id} completed at {}", order.final_price.unwrap_or(order.budget));
        }
        Ok(order)
    }

    async fn expire_overdue_orders(&self) -> Result<Vec<Order>, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        let expired = orders::expire_overdue(&mut conn).await?;
        if !expired.is_empty() {
            info!("🗃️ {} overdue orders cancelled", expired.len());
        }
        Ok(expired)
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.pool.close().await;
        Ok(())
    }
}

impl ExpertManagement for SqliteDatabase {
    async fn upsert_specialization(&self, spec: NewSpecialization) -> Result<Specialization, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        experts::upsert_specialization(spec, &mut conn).await
    }

    async fn candidate_snapshot(&self, subject: Option<&str>) -> Result<Vec<ExpertCandidate>, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        experts::candidate_snapshot(subject, &mut conn).await
    }

    async fn expert_workload(&self, expert_id: i64) -> Result<i64, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        orders::active_order_count(expert_id, &mut conn).await
    }

    async fn recompute_statistics(&self, expert_id: i64) -> Result<ExpertStatistics, BrokerError> {
        let mut tx = self.pool.begin().await?;
        let stats = statistics::recompute(expert_id, &mut tx).await?;
        tx.commit().await?;
        trace!(
            "📊️ Statistics for expert #{expert_id} rebuilt: {}/{} orders completed, rating {:.2}",
            stats.completed_orders,
            stats.total_orders,
            stats.average_rating
        );
        Ok(stats)
    }

    async fn fetch_statistics(&self, expert_id: i64) -> Result<Option<ExpertStatistics>, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        statistics::fetch(expert_id, &mut conn).await
    }

    async fn insert_rating(&self, rating: NewRating) -> Result<ExpertRating, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        ratings::insert_rating(rating, &mut conn).await
    }
}

impl DisputeManagement for SqliteDatabase {
    async fn open_dispute(
        &self,
        order_id: &OrderId,
        raised_by: i64,
        reason: &str,
        from: OrderStatusType,
    ) -> Result<(Dispute, Order), BrokerError> {
        let mut tx = self.pool.begin().await?;
        let dispute = disputes::insert_dispute(order_id, raised_by, reason, &mut tx).await?;
        let order = orders::update_order_status_checked(order_id, from, OrderStatusType::Disputed, &mut tx)
            .await?
            .ok_or_else(|| BrokerError::StorageConflict(order_id.clone()))?;
        tx.commit().await?;
        Ok((dispute, order))
    }

    async fn fetch_dispute(&self, dispute_id: i64) -> Result<Option<Dispute>, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        disputes::fetch_dispute(dispute_id, &mut conn).await
    }

    async fn fetch_open_dispute(&self, order_id: &OrderId) -> Result<Option<Dispute>, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        disputes::fetch_open_dispute(order_id, &mut conn).await
    }

    async fn assign_arbitrator(&self, dispute_id: i64, arbitrator_id: i64) -> Result<Dispute, BrokerError> {
        let mut conn = self.pool.acquire().await?;
        match disputes::assign_arbitrator(dispute_id, arbitrator_id, &mut conn).await? {
            Some(dispute) => {
                debug!("⚖️ Arbitrator #{arbitrator_id} assigned to dispute #{dispute_id}");
                Ok(dispute)
            },
            None => match disputes::fetch_dispute(dispute_id, &mut conn).await? {
                None => Err(BrokerError::DisputeNotFound(dispute_id)),
                Some(d) if d.resolved => {
                    Err(BrokerError::InvalidTransition(format!("dispute #{dispute_id} is already resolved")))
                },
                Some(d) => Err(BrokerError::InvalidTransition(format!(
                    "dispute #{dispute_id} is already assigned to arbitrator #{}",
                    d.arbitrator_id.unwrap_or_default()
                ))),
            },
        }
    }

    async fn resolve_dispute(
        &self,
        dispute_id: i64,
        outcome: DisputeOutcome,
        result_text: &str,
        order_to: OrderStatusType,
    ) -> Result<(Dispute, Order), BrokerError> {
        let mut tx = self.pool.begin().await?;
        let dispute = match disputes::resolve_dispute_checked(dispute_id, outcome, result_text, &mut tx).await? {
            Some(dispute) => dispute,
            None => {
                return match disputes::fetch_dispute(dispute_id, &mut tx).await? {
                    None => Err(BrokerError::DisputeNotFound(dispute_id)),
                    Some(_) => {
                        Err(BrokerError::InvalidTransition(format!("dispute #{dispute_id} is already resolved")))
                    },
                };
            },
        };
        let order = if order_to == OrderStatusType::Completed {
            orders::complete_order_checked(&dispute.order_id, OrderStatusType::Disputed, &mut tx).await?
        } else {
            orders::update_order_status_checked(&dispute.order_id, OrderStatusType::Disputed, order_to, &mut tx)
                .await?
        }
        .ok_or_else(|| BrokerError::StorageConflict(dispute.order_id.clone()))?;
        tx.commit().await?;
        debug!("⚖️ Dispute #{dispute_id} resolved as {outcome}; order {} is now {}", order.order_id, order.status);
        Ok((dispute, order))
    }
}
