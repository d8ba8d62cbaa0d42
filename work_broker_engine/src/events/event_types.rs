use serde::{Deserialize, Serialize};

use crate::db_types::{Dispute, DisputeOutcome, Order};

/// Emitted when an expert wins the claim on an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAssignedEvent {
    pub order: Order,
}

impl OrderAssignedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// Emitted when an order reaches `completed`, whether by client acceptance or arbitration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCompletedEvent {
    pub order: Order,
}

impl OrderCompletedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeOpenedEvent {
    pub dispute: Dispute,
}

impl DisputeOpenedEvent {
    pub fn new(dispute: Dispute) -> Self {
        Self { dispute }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeResolvedEvent {
    pub dispute: Dispute,
    pub outcome: DisputeOutcome,
}

impl DisputeResolvedEvent {
    pub fn new(dispute: Dispute, outcome: DisputeOutcome) -> Self {
        Self { dispute, outcome }
    }
}

#[derive(Debug, Clone)]
pub enum EventType {
    OrderAssigned(OrderAssignedEvent),
    OrderCompleted(OrderCompletedEvent),
    DisputeOpened(DisputeOpenedEvent),
    DisputeResolved(DisputeResolvedEvent),
}
