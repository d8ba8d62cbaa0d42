use std::fmt::Debug;

use log::*;

use crate::{
    broker_api::order_objects::OrderQueryFilter,
    db::common::{BrokerDatabase, BrokerError, ExpertManagement},
    db_types::{NewOrder, Order, OrderId, OrderStatusType},
    events::{EventProducers, OrderCompletedEvent},
    lifecycle::{next_status, Actor, OrderEvent, Role},
};

/// `OrderFlowApi` is the primary API for order intake and status transitions.
///
/// Claims go through [`crate::AssignmentApi`] and dispute events through [`crate::DisputeApi`]; everything else in
/// the lifecycle table (payment detour, submission, review/revision cycles, acceptance, pre-assignment
/// cancellation) is driven from here.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: BrokerDatabase + ExpertManagement
{
    /// Submit a new order to the broker.
    ///
    /// This should be a brand-new order. If an order with the same id already exists, an error is returned and
    /// nothing is changed.
    pub async fn process_new_order(&self, order: NewOrder) -> Result<Order, BrokerError> {
        let order_id = order.order_id.clone();
        let (order, inserted) = self.db.insert_order(order).await?;
        if !inserted {
            return Err(BrokerError::OrderAlreadyExists(order_id));
        }
        debug!("🔄️📦️ Order [{}] created for client #{} with budget {}", order.order_id, order.client_id, order.budget);
        Ok(order)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, BrokerError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| BrokerError::OrderNotFound(order_id.clone()))
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, BrokerError> {
        self.db.search_orders(query).await
    }

    /// Fires a lifecycle event against the order on behalf of `actor`.
    ///
    /// The transition is validated against the lifecycle table and the actor's roles, then applied with a
    /// conditional update. If a concurrent writer moved the order first, the call re-reads and re-validates once
    /// before giving up with [`BrokerError::OrderNotAvailable`].
    ///
    /// Completion fixes the final price, rebuilds the expert's statistics and emits [`OrderCompletedEvent`].
    pub async fn transition_order(
        &self,
        order_id: &OrderId,
        event: OrderEvent,
        actor: &Actor,
    ) -> Result<Order, BrokerError> {
        if event.requires_dedicated_api() {
            return Err(BrokerError::UnsupportedAction(format!("Event '{event}' via the generic transition entry point")));
        }
        let mut retried = false;
        loop {
            let order = self.fetch_order(order_id).await?;
            authorize_transition(actor, event, &order)?;
            let next = next_status(order.status, event)?;
            let applied = if next == OrderStatusType::Completed {
                self.db.complete_order(order_id, order.status).await?
            } else {
                self.db.apply_transition(order_id, order.status, next).await?
            };
            match applied {
                Some(updated) => {
                    debug!("🔄️📦️ Order {order_id}: {} --{event}--> {}", order.status, updated.status);
                    if updated.status == OrderStatusType::Completed {
                        self.handle_completion(&updated).await;
                    }
                    return Ok(updated);
                },
                None if !retried => {
                    debug!("🔄️📦️ Order {order_id} changed under event '{event}'. Retrying once.");
                    retried = true;
                },
                None => return Err(BrokerError::OrderNotAvailable(order_id.clone())),
            }
        }
    }

    /// Cancels every unclaimed order whose deadline has passed. Scheduled and idempotent; re-running after a
    /// partial failure is safe.
    pub async fn expire_overdue_orders(&self) -> Result<Vec<Order>, BrokerError> {
        let expired = self.db.expire_overdue_orders().await?;
        for order in &expired {
            debug!("🔄️📦️ Order {} cancelled after missing its deadline ({})", order.order_id, order.deadline);
        }
        Ok(expired)
    }

    async fn handle_completion(&self, order: &Order) {
        for emitter in &self.producers.order_completed_producer {
            debug!("🔄️📦️ Notifying order completed hook subscribers");
            emitter.publish_event(OrderCompletedEvent::new(order.clone())).await;
        }
        // The statistics rebuild is idempotent, so a failure here only delays the refresh until the next trigger.
        if let Some(expert_id) = order.expert_id {
            if let Err(e) = self.db.recompute_statistics(expert_id).await {
                warn!("📊️ Statistics refresh for expert #{expert_id} failed and will be retried: {e}");
            }
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

/// Checks that the actor may fire `event` on `order`: the actor must hold an allowed role, the acting client must
/// be the order's client, and the acting expert must be the assigned expert. The system role carries no identity.
pub(crate) fn authorize_transition(actor: &Actor, event: OrderEvent, order: &Order) -> Result<(), BrokerError> {
    let allowed = event.allowed_roles();
    let role = allowed
        .iter()
        .copied()
        .find(|r| actor.has_role(*r))
        .ok_or_else(|| BrokerError::PermissionDenied(format!("event '{event}' requires one of {allowed:?}")))?;
    match role {
        Role::Client if actor.id() != order.client_id => Err(BrokerError::PermissionDenied(format!(
            "actor #{} is not the client of order {}",
            actor.id(),
            order.order_id
        ))),
        Role::Expert if order.expert_id != Some(actor.id()) => Err(BrokerError::PermissionDenied(format!(
            "actor #{} is not the assigned expert of order {}",
            actor.id(),
            order.order_id
        ))),
        _ => Ok(()),
    }
}
