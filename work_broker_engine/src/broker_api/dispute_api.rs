use std::{env, fmt::Debug};

use log::*;
use thiserror::Error;

use crate::{
    broker_api::order_flow_api::authorize_transition,
    db::common::{BrokerDatabase, BrokerError, DisputeManagement, ExpertManagement},
    db_types::{Dispute, DisputeOutcome, OrderId, OrderStatusType},
    events::{DisputeOpenedEvent, DisputeResolvedEvent, EventProducers, OrderCompletedEvent},
    lifecycle::{next_status, Actor, OrderEvent, Role},
};

//--------------------------------------   CompensationPolicy  -------------------------------------------------------
/// Maps a resolution outcome to the percentage of the order price refunded to the client. The percentages are
/// data, not code: arbitration hands the chosen percentage to the payment collaborator as an explicit
/// instruction and never computes refunds itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompensationPolicy {
    pub favor_expert: u8,
    pub favor_client: u8,
    pub compromise: u8,
}

impl Default for CompensationPolicy {
    fn default() -> Self {
        Self { favor_expert: 0, favor_client: 100, compromise: 50 }
    }
}

impl CompensationPolicy {
    pub fn percentage_for(&self, outcome: DisputeOutcome) -> u8 {
        match outcome {
            DisputeOutcome::FavorExpert => self.favor_expert,
            DisputeOutcome::FavorClient => self.favor_client,
            DisputeOutcome::Compromise => self.compromise,
        }
    }

    /// Reads `EWB_REFUND_FAVOR_EXPERT`, `EWB_REFUND_FAVOR_CLIENT` and `EWB_REFUND_COMPROMISE`, falling back to
    /// the default for any variable that is missing or not a percentage.
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        Self {
            favor_expert: env_percentage("EWB_REFUND_FAVOR_EXPERT", defaults.favor_expert),
            favor_client: env_percentage("EWB_REFUND_FAVOR_CLIENT", defaults.favor_client),
            compromise: env_percentage("EWB_REFUND_COMPROMISE", defaults.compromise),
        }
    }
}

fn env_percentage(var: &str, default: u8) -> u8 {
    match env::var(var) {
        Ok(s) => match s.parse::<u8>() {
            Ok(pct) if pct <= 100 => pct,
            _ => {
                error!("🪛️ {s} is not a valid percentage for {var}. Using the default, {default}, instead.");
                default
            },
        },
        Err(_) => default,
    }
}

//--------------------------------------    PaymentGateway     -------------------------------------------------------
#[derive(Debug, Clone, Error)]
#[error("Compensation instruction failed: {0}")]
pub struct CompensationError(pub String);

/// The seam to the payment collaborator. Called only from dispute resolution; a failure never rolls the
/// resolution back.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    async fn instruct_compensation(&self, order_id: &OrderId, percentage: u8) -> Result<(), CompensationError>;
}

/// Reference gateway: records the instruction in the log and succeeds. Deployments wire in a real payment
/// provider integration here.
#[derive(Debug, Default, Clone)]
pub struct LoggingPaymentGateway;

impl PaymentGateway for LoggingPaymentGateway {
    async fn instruct_compensation(&self, order_id: &OrderId, percentage: u8) -> Result<(), CompensationError> {
        info!("💳️ Compensation instruction: refund {percentage}% of order {order_id} to the client");
        Ok(())
    }
}

//--------------------------------------      DisputeApi       -------------------------------------------------------
/// Dispute arbitration: opening a conflict on an active order, assigning an arbitrator, and applying resolutions
/// that drive the order to a terminal state plus a compensation instruction.
pub struct DisputeApi<B, P> {
    db: B,
    producers: EventProducers,
    policy: CompensationPolicy,
    payments: P,
}

impl<B, P> Debug for DisputeApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DisputeApi")
    }
}

impl<B, P> DisputeApi<B, P> {
    pub fn new(db: B, producers: EventProducers, policy: CompensationPolicy, payments: P) -> Self {
        Self { db, producers, policy, payments }
    }

    pub fn policy(&self) -> &CompensationPolicy {
        &self.policy
    }
}

impl<B, P> DisputeApi<B, P>
where
    B: BrokerDatabase + DisputeManagement + ExpertManagement,
    P: PaymentGateway,
{
    /// Opens a dispute on the order on behalf of its client or assigned expert and moves the order to `disputed`.
    ///
    /// The one-unresolved-dispute-per-order rule is enforced by the storage layer, so two simultaneous opens
    /// produce exactly one dispute. If the order's status moved between the read and the write, the call
    /// re-validates once before giving up.
    pub async fn open_dispute(&self, order_id: &OrderId, actor: &Actor, reason: &str) -> Result<Dispute, BrokerError> {
        let mut retried = false;
        loop {
            let order = self
                .db
                .fetch_order(order_id)
                .await?
                .ok_or_else(|| BrokerError::OrderNotFound(order_id.clone()))?;
            authorize_transition(actor, OrderEvent::DisputeRaised, &order)?;
            next_status(order.status, OrderEvent::DisputeRaised)?;
            match self.db.open_dispute(order_id, actor.id(), reason, order.status).await {
                Ok((dispute, _order)) => {
                    info!("⚖️ Dispute #{} opened on order {order_id}: {reason}", dispute.id);
                    for emitter in &self.producers.dispute_opened_producer {
                        debug!("⚖️ Notifying dispute opened hook subscribers");
                        emitter.publish_event(DisputeOpenedEvent::new(dispute.clone())).await;
                    }
                    return Ok(dispute);
                },
                Err(BrokerError::StorageConflict(_)) if !retried => {
                    debug!("⚖️ Order {order_id} changed while opening a dispute. Retrying once.");
                    retried = true;
                },
                Err(BrokerError::StorageConflict(_)) => {
                    return Err(BrokerError::OrderNotAvailable(order_id.clone()))
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Assigns an arbitrator to the dispute. Re-assigning the same arbitrator is idempotent; anything else on an
    /// assigned or resolved dispute fails.
    pub async fn assign_arbitrator(&self, dispute_id: i64, arbitrator_id: i64) -> Result<Dispute, BrokerError> {
        self.db.assign_arbitrator(dispute_id, arbitrator_id).await
    }

    /// Applies the arbitrator's verdict: marks the dispute resolved, drives the order to its terminal state, and
    /// hands the policy's refund percentage to the payment collaborator.
    ///
    /// Only the assigned arbitrator may resolve. Re-resolving fails with
    /// [`BrokerError::InvalidTransition`]. The compensation instruction and the statistics refresh happen after
    /// the resolution commits; their failures are logged and never undo the resolution.
    pub async fn resolve_dispute(
        &self,
        dispute_id: i64,
        actor: &Actor,
        outcome: DisputeOutcome,
        result_text: &str,
    ) -> Result<Dispute, BrokerError> {
        let dispute = self
            .db
            .fetch_dispute(dispute_id)
            .await?
            .ok_or(BrokerError::DisputeNotFound(dispute_id))?;
        if dispute.resolved {
            return Err(BrokerError::InvalidTransition(format!("dispute #{dispute_id} is already resolved")));
        }
        if !actor.has_role(Role::Arbitrator) {
            return Err(BrokerError::PermissionDenied(format!(
                "actor #{} is not an arbitrator",
                actor.id()
            )));
        }
        match dispute.arbitrator_id {
            None => {
                return Err(BrokerError::InvalidTransition(format!(
                    "no arbitrator has been assigned to dispute #{dispute_id}"
                )))
            },
            Some(assigned) if assigned != actor.id() => {
                return Err(BrokerError::PermissionDenied(format!(
                    "dispute #{dispute_id} is assigned to arbitrator #{assigned}, not #{}",
                    actor.id()
                )))
            },
            Some(_) => {},
        }
        let order = self
            .db
            .fetch_order(&dispute.order_id)
            .await?
            .ok_or_else(|| BrokerError::OrderNotFound(dispute.order_id.clone()))?;
        let order_to = next_status(order.status, order_event_for(outcome))?;
        let (dispute, order) = self.db.resolve_dispute(dispute_id, outcome, result_text, order_to).await?;

        let percentage = self.policy.percentage_for(outcome);
        if percentage > 0 {
            if let Err(e) = self.payments.instruct_compensation(&order.order_id, percentage).await {
                error!(
                    "⚖️ Compensation instruction for order {} failed after resolving dispute #{dispute_id}: {e}",
                    order.order_id
                );
            }
        }
        if let Some(expert_id) = order.expert_id {
            if let Err(e) = self.db.recompute_statistics(expert_id).await {
                warn!("📊️ Statistics refresh for expert #{expert_id} failed and will be retried: {e}");
            }
        }
        if order.status == OrderStatusType::Completed {
            for emitter in &self.producers.order_completed_producer {
                emitter.publish_event(OrderCompletedEvent::new(order.clone())).await;
            }
        }
        for emitter in &self.producers.dispute_resolved_producer {
            debug!("⚖️ Notifying dispute resolved hook subscribers");
            emitter.publish_event(DisputeResolvedEvent::new(dispute.clone(), outcome)).await;
        }
        Ok(dispute)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

/// The lifecycle event a resolution outcome maps to: the deliverable standing completes the order, both refund
/// outcomes cancel it.
pub fn order_event_for(outcome: DisputeOutcome) -> OrderEvent {
    match outcome {
        DisputeOutcome::FavorExpert => OrderEvent::ResolvedCompleted,
        DisputeOutcome::FavorClient | DisputeOutcome::Compromise => OrderEvent::ResolvedCancelled,
    }
}
