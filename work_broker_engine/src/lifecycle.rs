//! The order lifecycle state machine.
//!
//! Transitions are a total function of `(current status, event)`: every pair is either in the table below or fails
//! with [`InvalidTransition`]. The functions here are pure and never touch storage; applying a transition to a
//! stored order is the job of the API layer, which pairs the computed target status with a conditional update so
//! that concurrent writers cannot interleave.
//!
//! | From                              | Event              | To              | Actor            |
//! |-----------------------------------|--------------------|-----------------|------------------|
//! | new                               | PaymentInitiated   | waiting_payment | client           |
//! | waiting_payment                   | PaymentConfirmed   | in_progress     | system           |
//! | new                               | Claimed            | in_progress     | expert           |
//! | in_progress                       | Submitted          | review          | expert           |
//! | review                            | RevisionRequested  | revision        | client           |
//! | review                            | Accepted           | completed       | client           |
//! | revision                          | Resubmitted        | review          | expert           |
//! | in_progress, review, revision     | DisputeRaised      | disputed        | client or expert |
//! | disputed                          | ResolvedCompleted  | completed       | arbitrator       |
//! | disputed                          | ResolvedCancelled  | cancelled       | arbitrator       |
//! | new                               | Cancelled          | cancelled       | client or system |

use std::{collections::HashSet, fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{ConversionError, OrderStatusType};

//--------------------------------------         Role          -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Expert,
    System,
    Arbitrator,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Client => "client",
            Role::Expert => "expert",
            Role::System => "system",
            Role::Arbitrator => "arbitrator",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Role {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Self::Client),
            "expert" => Ok(Self::Expert),
            "system" => Ok(Self::System),
            "arbitrator" => Ok(Self::Arbitrator),
            s => Err(ConversionError::new(format!("Invalid role: {s}"))),
        }
    }
}

//--------------------------------------        Actor          -------------------------------------------------------
/// The resolved identity making a call into the broker. Built once per request from whatever authentication layer
/// fronts the engine and passed explicitly into every service call; the engine never re-derives roles from global
/// state.
#[derive(Debug, Clone)]
pub struct Actor {
    id: i64,
    roles: HashSet<Role>,
}

impl Actor {
    pub fn new<I: IntoIterator<Item = Role>>(id: i64, roles: I) -> Self {
        Self { id, roles: roles.into_iter().collect() }
    }

    pub fn client(id: i64) -> Self {
        Self::new(id, [Role::Client])
    }

    pub fn expert(id: i64) -> Self {
        Self::new(id, [Role::Expert])
    }

    pub fn arbitrator(id: i64) -> Self {
        Self::new(id, [Role::Arbitrator])
    }

    /// The scheduler / automation identity. Carries no user id.
    pub fn system() -> Self {
        Self::new(0, [Role::System])
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

//--------------------------------------      OrderEvent       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    PaymentInitiated,
    PaymentConfirmed,
    Claimed,
    Submitted,
    RevisionRequested,
    Accepted,
    Resubmitted,
    DisputeRaised,
    ResolvedCompleted,
    ResolvedCancelled,
    Cancelled,
}

impl OrderEvent {
    pub const ALL: [OrderEvent; 11] = [
        OrderEvent::PaymentInitiated,
        OrderEvent::PaymentConfirmed,
        OrderEvent::Claimed,
        OrderEvent::Submitted,
        OrderEvent::RevisionRequested,
        OrderEvent::Accepted,
        OrderEvent::Resubmitted,
        OrderEvent::DisputeRaised,
        OrderEvent::ResolvedCompleted,
        OrderEvent::ResolvedCancelled,
        OrderEvent::Cancelled,
    ];

    /// The roles that may trigger this event. Identity checks (the acting client must own the order, the acting
    /// expert must be the assigned expert) are applied by the API layer on top of this.
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            OrderEvent::PaymentInitiated => &[Role::Client],
            OrderEvent::PaymentConfirmed => &[Role::System],
            OrderEvent::Claimed => &[Role::Expert],
            OrderEvent::Submitted => &[Role::Expert],
            OrderEvent::RevisionRequested => &[Role::Client],
            OrderEvent::Accepted => &[Role::Client],
            OrderEvent::Resubmitted => &[Role::Expert],
            OrderEvent::DisputeRaised => &[Role::Client, Role::Expert],
            OrderEvent::ResolvedCompleted => &[Role::Arbitrator],
            OrderEvent::ResolvedCancelled => &[Role::Arbitrator],
            OrderEvent::Cancelled => &[Role::Client, Role::System],
        }
    }

    /// Claims and dispute events carry extra bookkeeping (eligibility checks, dispute rows, compensation) and must
    /// go through [`crate::AssignmentApi`] or [`crate::DisputeApi`] rather than the generic transition entry point.
    pub fn requires_dedicated_api(&self) -> bool {
        matches!(
            self,
            OrderEvent::Claimed
                | OrderEvent::DisputeRaised
                | OrderEvent::ResolvedCompleted
                | OrderEvent::ResolvedCancelled
        )
    }
}

impl Display for OrderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderEvent::PaymentInitiated => "payment_initiated",
            OrderEvent::PaymentConfirmed => "payment_confirmed",
            OrderEvent::Claimed => "claimed",
            OrderEvent::Submitted => "submitted",
            OrderEvent::RevisionRequested => "revision_requested",
            OrderEvent::Accepted => "accepted",
            OrderEvent::Resubmitted => "resubmitted",
            OrderEvent::DisputeRaised => "dispute_raised",
            OrderEvent::ResolvedCompleted => "resolved_completed",
            OrderEvent::ResolvedCancelled => "resolved_cancelled",
            OrderEvent::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for OrderEvent {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payment_initiated" => Ok(Self::PaymentInitiated),
            "payment_confirmed" => Ok(Self::PaymentConfirmed),
            "claimed" => Ok(Self::Claimed),
            "submitted" => Ok(Self::Submitted),
            "revision_requested" => Ok(Self::RevisionRequested),
            "accepted" => Ok(Self::Accepted),
            "resubmitted" => Ok(Self::Resubmitted),
            "dispute_raised" => Ok(Self::DisputeRaised),
            "resolved_completed" => Ok(Self::ResolvedCompleted),
            "resolved_cancelled" => Ok(Self::ResolvedCancelled),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError::new(format!("Invalid order event: {s}"))),
        }
    }
}

//--------------------------------------   InvalidTransition   -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No transition for event '{event}' from state '{from}'")]
pub struct InvalidTransition {
    pub from: OrderStatusType,
    pub event: OrderEvent,
}

//--------------------------------------     next_status       -------------------------------------------------------
/// Computes the status an order moves to when `event` fires in state `from`. Pairs outside the transition table
/// fail with [`InvalidTransition`] and imply no state change.
pub fn next_status(from: OrderStatusType, event: OrderEvent) -> Result<OrderStatusType, InvalidTransition> {
    use OrderEvent as Ev;
    use OrderStatusType::*;
    match (from, event) {
        (New, Ev::PaymentInitiated) => Ok(WaitingPayment),
        (WaitingPayment, Ev::PaymentConfirmed) => Ok(InProgress),
        (New, Ev::Claimed) => Ok(InProgress),
        (InProgress, Ev::Submitted) => Ok(Review),
        (Review, Ev::RevisionRequested) => Ok(Revision),
        (Review, Ev::Accepted) => Ok(Completed),
        (Revision, Ev::Resubmitted) => Ok(Review),
        (InProgress | Review | Revision, Ev::DisputeRaised) => Ok(Disputed),
        (Disputed, Ev::ResolvedCompleted) => Ok(Completed),
        (Disputed, Ev::ResolvedCancelled) => Ok(Cancelled),
        (New, Ev::Cancelled) => Ok(Cancelled),
        (from, event) => Err(InvalidTransition { from, event }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db_types::OrderStatusType::*;

    const ALL_STATES: [OrderStatusType; 8] =
        [New, WaitingPayment, InProgress, Review, Revision, Completed, Disputed, Cancelled];

    fn table() -> Vec<(OrderStatusType, OrderEvent, OrderStatusType)> {
        use OrderEvent as Ev;
        vec![
            (New, Ev::PaymentInitiated, WaitingPayment),
            (WaitingPayment, Ev::PaymentConfirmed, InProgress),
            (New, Ev::Claimed, InProgress),
            (InProgress, Ev::Submitted, Review),
            (Review, Ev::RevisionRequested, Revision),
            (Review, Ev::Accepted, Completed),
            (Revision, Ev::Resubmitted, Review),
            (InProgress, Ev::DisputeRaised, Disputed),
            (Review, Ev::DisputeRaised, Disputed),
            (Revision, Ev::DisputeRaised, Disputed),
            (Disputed, Ev::ResolvedCompleted, Completed),
            (Disputed, Ev::ResolvedCancelled, Cancelled),
            (New, Ev::Cancelled, Cancelled),
        ]
    }

    #[test]
    fn table_transitions_succeed() {
        for (from, event, to) in table() {
            assert_eq!(next_status(from, event), Ok(to), "{from} --{event}--> {to}");
        }
    }

    /// Every (state, event) pair outside the table must fail and name the offending pair.
    #[test]
    fn transition_closure() {
        let table = table();
        for from in ALL_STATES {
            for event in OrderEvent::ALL {
                let expected = table.iter().find(|(f, e, _)| *f == from && *e == event);
                match (expected, next_status(from, event)) {
                    (Some((_, _, to)), Ok(next)) => assert_eq!(next, *to),
                    (None, Err(e)) => {
                        assert_eq!(e.from, from);
                        assert_eq!(e.event, event);
                    },
                    (Some(_), Err(e)) => panic!("{from} --{event}--> should succeed, got {e}"),
                    (None, Ok(next)) => panic!("{from} --{event}--> {next} should be rejected"),
                }
            }
        }
    }

    #[test]
    fn terminal_states_reject_everything() {
        for from in [Completed, Cancelled] {
            for event in OrderEvent::ALL {
                assert!(next_status(from, event).is_err(), "{from} --{event}--> must fail");
            }
        }
    }

    #[test]
    fn actor_roles() {
        let actor = Actor::new(7, [Role::Client, Role::Expert]);
        assert_eq!(actor.id(), 7);
        assert!(actor.has_role(Role::Client));
        assert!(actor.has_role(Role::Expert));
        assert!(!actor.has_role(Role::Arbitrator));
        assert!(Actor::system().has_role(Role::System));
    }

    #[test]
    fn event_round_trips() {
        for event in OrderEvent::ALL {
            let parsed: OrderEvent = event.to_string().parse().unwrap();
            assert_eq!(parsed, event);
        }
        assert!("paid".parse::<OrderEvent>().is_err());
    }
}
