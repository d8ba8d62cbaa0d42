use std::fmt::Debug;

use log::*;

use crate::{
    db::common::{BrokerDatabase, BrokerError, ExpertManagement},
    db_types::{Order, OrderId},
    events::{EventProducers, OrderAssignedEvent},
    matcher::{rank_candidates, RankedCandidate, DEFAULT_CANDIDATE_LIMIT},
};

/// Matching and assignment: ranks eligible experts for an order and lets one of them claim it.
pub struct AssignmentApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for AssignmentApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AssignmentApi")
    }
}

impl<B> AssignmentApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> AssignmentApi<B>
where B: BrokerDatabase + ExpertManagement
{
    /// Ranks the experts holding a verified specialization for the order's subject. Reads one snapshot of
    /// workloads and aggregates; the ranking itself is the pure function in [`crate::matcher`].
    pub async fn find_candidates(
        &self,
        order_id: &OrderId,
        limit: Option<usize>,
    ) -> Result<Vec<RankedCandidate>, BrokerError> {
        let order = self
            .db
            .fetch_order(order_id)
            .await?
            .ok_or_else(|| BrokerError::OrderNotFound(order_id.clone()))?;
        let snapshot = self.db.candidate_snapshot(order.subject.as_deref()).await?;
        let ranked = rank_candidates(snapshot, limit.unwrap_or(DEFAULT_CANDIDATE_LIMIT));
        debug!("🎯️ {} candidates ranked for order {order_id}", ranked.len());
        Ok(ranked)
    }

    /// Claims the order for the expert.
    ///
    /// Exactly one of any number of concurrent claimants succeeds; the rest receive
    /// [`BrokerError::OrderNotAvailable`]. On success the order is `in_progress`, the expert is recorded, and an
    /// [`OrderAssignedEvent`] goes out to the notification seam. Failed claims change nothing.
    pub async fn take_order(&self, order_id: &OrderId, expert_id: i64) -> Result<Order, BrokerError> {
        let order = self.db.claim_order(order_id, expert_id).await?;
        info!("🎯️ Order {order_id} assigned to expert #{expert_id}");
        for emitter in &self.producers.order_assigned_producer {
            debug!("🎯️ Notifying order assigned hook subscribers");
            emitter.publish_event(OrderAssignedEvent::new(order.clone())).await;
        }
        Ok(order)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
