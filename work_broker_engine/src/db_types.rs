use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use ewb_common::Money;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

//--------------------------------------   OrderStatusType     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatusType {
    /// The order is newly created and has neither a payment nor an assigned expert.
    New,
    /// The client has initiated payment and the broker is waiting for confirmation.
    WaitingPayment,
    /// An expert is working on the order.
    InProgress,
    /// A deliverable has been submitted and is waiting for the client's verdict.
    Review,
    /// The client has requested changes and the expert is reworking the deliverable.
    Revision,
    /// The order has been accepted and paid out. Terminal.
    Completed,
    /// A conflict is open on the order and an arbitrator must resolve it.
    Disputed,
    /// The order has been cancelled or refunded. Terminal.
    Cancelled,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatusType::Completed | OrderStatusType::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatusType::New => "new",
            OrderStatusType::WaitingPayment => "waiting_payment",
            OrderStatusType::InProgress => "in_progress",
            OrderStatusType::Review => "review",
            OrderStatusType::Revision => "revision",
            OrderStatusType::Completed => "completed",
            OrderStatusType::Disputed => "disputed",
            OrderStatusType::Cancelled => "cancelled",
        }
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

impl ConversionError {
    pub fn new<S: Into<String>>(msg: S) -> Self {
        Self(msg.into())
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "waiting_payment" => Ok(Self::WaitingPayment),
            "in_progress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "revision" => Ok(Self::Revision),
            "completed" => Ok(Self::Completed),
            "disputed" => Ok(Self::Disputed),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to New");
            OrderStatusType::New
        })
    }
}

//--------------------------------------      WorkType         -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    Essay,
    Coursework,
    Thesis,
    LabReport,
    Presentation,
    Other,
}

impl Display for WorkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkType::Essay => "essay",
            WorkType::Coursework => "coursework",
            WorkType::Thesis => "thesis",
            WorkType::LabReport => "lab_report",
            WorkType::Presentation => "presentation",
            WorkType::Other => "other",
        };
        write!(f, "{s}")
    }
}

impl FromStr for WorkType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "essay" => Ok(Self::Essay),
            "coursework" => Ok(Self::Coursework),
            "thesis" => Ok(Self::Thesis),
            "lab_report" => Ok(Self::LabReport),
            "presentation" => Ok(Self::Presentation),
            "other" => Ok(Self::Other),
            s => Err(ConversionError(format!("Invalid work type: {s}"))),
        }
    }
}

//--------------------------------------        OrderId        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        Order          -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub client_id: i64,
    /// The assigned expert. Set exactly when the order has been claimed.
    pub expert_id: Option<i64>,
    pub subject: Option<String>,
    pub work_type: WorkType,
    pub complexity: i64,
    pub budget: Money,
    /// Fixed at completion time. Defaults to the budget when no other price was negotiated.
    pub final_price: Option<Money>,
    pub status: OrderStatusType,
    pub deadline: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        NewOrder       -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// The order_id as assigned by the storefront
    pub order_id: OrderId,
    /// The client placing the order
    pub client_id: i64,
    /// The subject the work falls under. Gates which experts may claim the order.
    pub subject: Option<String>,
    pub work_type: WorkType,
    /// Client's estimate of difficulty, 1 (trivial) to 5 (hard)
    pub complexity: i64,
    /// The client's budget for the work
    pub budget: Money,
    /// The hand-in deadline. Unclaimed orders are cancelled once this passes.
    pub deadline: DateTime<Utc>,
}

impl NewOrder {
    pub fn new(order_id: OrderId, client_id: i64, budget: Money, deadline: DateTime<Utc>) -> Self {
        Self { order_id, client_id, subject: None, work_type: WorkType::Other, complexity: 1, budget, deadline }
    }

    pub fn with_subject<S: Into<String>>(mut self, subject: S) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_work_type(mut self, work_type: WorkType) -> Self {
        self.work_type = work_type;
        self
    }

    pub fn with_complexity(mut self, complexity: i64) -> Self {
        self.complexity = complexity;
        self
    }
}

//--------------------------------------    Specialization     -------------------------------------------------------
/// A verified (expert, subject) capability record. Only verified specializations gate order claims.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Specialization {
    pub id: i64,
    pub expert_id: i64,
    pub subject: String,
    pub experience_years: i64,
    pub hourly_rate: Money,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSpecialization {
    pub expert_id: i64,
    pub subject: String,
    pub experience_years: i64,
    pub hourly_rate: Money,
    pub is_verified: bool,
}

impl NewSpecialization {
    pub fn new<S: Into<String>>(expert_id: i64, subject: S) -> Self {
        Self {
            expert_id,
            subject: subject.into(),
            experience_years: 0,
            hourly_rate: Money::default(),
            is_verified: false,
        }
    }

    pub fn verified(mut self) -> Self {
        self.is_verified = true;
        self
    }

    pub fn with_experience(mut self, years: i64) -> Self {
        self.experience_years = years;
        self
    }

    pub fn with_hourly_rate(mut self, rate: Money) -> Self {
        self.hourly_rate = rate;
        self
    }
}

//--------------------------------------   ExpertStatistics    -------------------------------------------------------
/// Derived per-expert aggregates. Owned exclusively by the statistics aggregator and rebuilt from the order and
/// rating rows; never hand-edited.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExpertStatistics {
    pub expert_id: i64,
    pub total_orders: i64,
    pub completed_orders: i64,
    pub average_rating: f64,
    /// completed / total × 100
    pub success_rate: f64,
    pub total_earnings: Money,
    /// Mean seconds between order creation and claim, over the expert's claimed orders.
    pub response_time_avg: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     ExpertRating      -------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExpertRating {
    pub id: i64,
    pub expert_id: i64,
    pub client_id: i64,
    pub order_id: OrderId,
    /// 1 to 5 stars
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRating {
    pub expert_id: i64,
    pub client_id: i64,
    pub order_id: OrderId,
    pub rating: i64,
    pub comment: Option<String>,
}

//--------------------------------------    DisputeOutcome     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisputeOutcome {
    /// The deliverable stands. The order completes and the expert is paid in full.
    FavorExpert,
    /// The client is refunded in full and the order is cancelled.
    FavorClient,
    /// The order is cancelled with a partial refund.
    Compromise,
}

impl Display for DisputeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DisputeOutcome::FavorExpert => "favor_expert",
            DisputeOutcome::FavorClient => "favor_client",
            DisputeOutcome::Compromise => "compromise",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DisputeOutcome {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "favor_expert" => Ok(Self::FavorExpert),
            "favor_client" => Ok(Self::FavorClient),
            "compromise" => Ok(Self::Compromise),
            s => Err(ConversionError(format!("Invalid dispute outcome: {s}"))),
        }
    }
}

//--------------------------------------       Dispute         -------------------------------------------------------
/// An open conflict episode on an order. At most one unresolved dispute may exist per order; the constraint is
/// enforced at the storage level.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Dispute {
    pub id: i64,
    pub order_id: OrderId,
    /// The client or expert who raised the conflict
    pub raised_by: i64,
    pub reason: String,
    pub arbitrator_id: Option<i64>,
    pub resolved: bool,
    pub outcome: Option<DisputeOutcome>,
    pub result_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

//--------------------------------------   ExpertCandidate     -------------------------------------------------------
/// A snapshot row describing one expert eligible for an order: verified specialization in the order's subject,
/// current aggregates and active workload. Input to the ranking function in [`crate::matcher`].
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExpertCandidate {
    pub expert_id: i64,
    pub avg_rating: f64,
    /// In [0, 100]
    pub success_rate: f64,
    pub experience_years: i64,
    /// Count of the expert's orders currently in progress or under revision
    pub workload: i64,
}
