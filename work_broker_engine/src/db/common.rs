use thiserror::Error;

use crate::{
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
    broker_api::order_objects::OrderQueryFilter,
    lifecycle::InvalidTransition,
};

/// This trait defines the core storage behaviour for backends supporting the work broker engine: order intake,
/// the atomic claim, conditional status updates and deadline expiry.
///
/// Every mutation that can race (claims, status changes, dispute creation) is expressed as a single conditional
/// storage operation. Backends must execute these atomically: a read in application code followed by an
/// unconditional write is not an acceptable implementation.
#[allow(async_fn_in_trait)]
pub trait BrokerDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new order. This call is idempotent: the second element is `false` if an order with the same
    /// `order_id` already existed, in which case the stored order is returned unchanged.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), BrokerError>;

    /// Retrieves the order with the given external id, or `None`.
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, BrokerError>;

    /// Fetches orders according to the criteria in the filter, ordered by `created_at` ascending.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, BrokerError>;

    /// Claims the order for the given expert.
    ///
    /// Eligibility (the order exists, the expert holds a verified specialization for the order's subject, the
    /// expert is under the workload cap) is checked first; the claim itself is a single conditional update that
    /// only succeeds while the order is still `new` and unassigned. Exactly one of any number of concurrent
    /// claimants wins; the rest receive [`BrokerError::OrderNotAvailable`].
    async fn claim_order(&self, order_id: &OrderId, expert_id: i64) -> Result<Order, BrokerError>;

    /// Moves the order from `from` to `to` with a conditional update. Returns `None` if the order was no longer
    /// in `from` (a concurrent writer got there first); the caller decides whether to retry.
    async fn apply_transition(
        &self,
        order_id: &OrderId,
        from: OrderStatusType,
        to: OrderStatusType,
    ) -> Result<Option<Order>, BrokerError>;

    /// Like [`Self::apply_transition`] with `to = completed`, additionally fixing the final price (defaulting to
    /// the budget when none was negotiated).
    async fn complete_order(&self, order_id: &OrderId, from: OrderStatusType) -> Result<Option<Order>, BrokerError>;

    /// Cancels every `new` order whose deadline has passed and returns the cancelled orders. Idempotent: orders
    /// already cancelled are not touched, so the operation can be re-run by a scheduler at any time.
    async fn expire_overdue_orders(&self) -> Result<Vec<Order>, BrokerError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Expert-side storage: specializations, the matching snapshot, ratings and the derived statistics row.
#[allow(async_fn_in_trait)]
pub trait ExpertManagement {
    /// Creates or updates the (expert, subject) specialization record.
    async fn upsert_specialization(&self, spec: NewSpecialization) -> Result<Specialization, BrokerError>;

    /// A consistent snapshot of every expert holding a verified specialization for `subject` (or any verified
    /// specialization when no subject is given), with their current aggregates and active workload.
    async fn candidate_snapshot(&self, subject: Option<&str>) -> Result<Vec<ExpertCandidate>, BrokerError>;

    /// Count of the expert's orders currently in progress or under revision.
    async fn expert_workload(&self, expert_id: i64) -> Result<i64, BrokerError>;

    /// Rebuilds the expert's statistics row from the order and rating rows. The reads happen in a single
    /// transaction and the row is rewritten from scratch, so the operation is idempotent and safe to re-run
    /// after a failure or in any order relative to other recomputes.
    async fn recompute_statistics(&self, expert_id: i64) -> Result<ExpertStatistics, BrokerError>;

    /// Returns the stored statistics row, or `None` if it has never been computed.
    async fn fetch_statistics(&self, expert_id: i64) -> Result<Option<ExpertStatistics>, BrokerError>;

    /// Stores a rating. At most one rating exists per order; a duplicate fails with
    /// [`BrokerError::RatingAlreadyExists`].
    async fn insert_rating(&self, rating: NewRating) -> Result<ExpertRating, BrokerError>;
}

/// Dispute storage. Creation and resolution pair the dispute write with the order's status change in one
/// transaction so that neither can be observed without the other.
#[allow(async_fn_in_trait)]
pub trait DisputeManagement {
    /// Creates a dispute for the order and moves the order from `from` to `disputed`.
    ///
    /// The one-unresolved-dispute-per-order constraint is enforced at the storage level; a second open dispute
    /// fails with [`BrokerError::DisputeAlreadyExists`] no matter how the calls interleave. Returns the dispute
    /// and the updated order.
    async fn open_dispute(
        &self,
        order_id: &OrderId,
        raised_by: i64,
        reason: &str,
        from: OrderStatusType,
    ) -> Result<(Dispute, Order), BrokerError>;

    async fn fetch_dispute(&self, dispute_id: i64) -> Result<Option<Dispute>, BrokerError>;

    /// The unresolved dispute for the order, if one exists.
    async fn fetch_open_dispute(&self, order_id: &OrderId) -> Result<Option<Dispute>, BrokerError>;

    /// Sets the arbitrator on an unresolved dispute. Re-assigning the same arbitrator is a no-op returning the
    /// dispute unchanged; assigning over a different arbitrator or touching a resolved dispute fails with
    /// [`BrokerError::InvalidTransition`].
    async fn assign_arbitrator(&self, dispute_id: i64, arbitrator_id: i64) -> Result<Dispute, BrokerError>;

    /// Marks the dispute resolved with the given outcome and moves the order from `disputed` to `order_to` in the
    /// same transaction. Re-resolving fails with [`BrokerError::InvalidTransition`].
    async fn resolve_dispute(
        &self,
        dispute_id: i64,
        outcome: DisputeOutcome,
        result_text: &str,
        order_to: OrderStatusType,
    ) -> Result<(Dispute, Order), BrokerError>;
}

//--------------------------------------      BrokerError      -------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Cannot insert order, since it already exists: {0}")]
    OrderAlreadyExists(OrderId),
    #[error("Order {0} has already been claimed or is no longer open")]
    OrderNotAvailable(OrderId),
    #[error("Expert #{expert_id} holds no verified specialization for '{subject}'")]
    ExpertNotQualified { expert_id: i64, subject: String },
    #[error("Expert #{expert_id} already has {active} active orders")]
    ExpertOverloaded { expert_id: i64, active: i64 },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("An unresolved dispute already exists for order {0}")]
    DisputeAlreadyExists(OrderId),
    #[error("The requested dispute #{0} does not exist")]
    DisputeNotFound(i64),
    #[error("Order {0} has already been rated")]
    RatingAlreadyExists(OrderId),
    #[error("Ratings run from 1 to 5, got {0}")]
    InvalidRating(i64),
    #[error("Order {0} is not completed")]
    OrderNotCompleted(OrderId),
    #[error("A conditional update on order {0} lost the race")]
    StorageConflict(OrderId),
    #[error("{0} is not supported here")]
    UnsupportedAction(String),
}

impl From<sqlx::Error> for BrokerError {
    fn from(e: sqlx::Error) -> Self {
        BrokerError::DatabaseError(e.to_string())
    }
}

impl From<InvalidTransition> for BrokerError {
    fn from(e: InvalidTransition) -> Self {
        BrokerError::InvalidTransition(e.to_string())
    }
}
