//! Expert Work Broker Engine
//!
//! The broker engine matches academic-work orders with qualified experts and shepherds each order through its
//! lifecycle: claim, delivery, review/revision cycles, completion or arbitration. This library contains the core
//! logic only. Transports (REST, RPC, CLI) wrap the APIs exposed here; authentication, chat, payment providers and
//! notification delivery are external collaborators reached through narrow seams.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@db`]). SQLite is the reference backend, selected with the `sqlite`
//!    cargo feature. You should never need to access the database directly. Instead, use the APIs in
//!    [`mod@broker_api`]. The exception is the data types used in the database, which are defined in the
//!    [`mod@db_types`] module and are public.
//! 2. The pure domain rules: the order state machine ([`mod@lifecycle`]) and the expert ranking function
//!    ([`mod@matcher`]). Both are total functions over in-memory snapshots and never touch storage.
//! 3. The broker public API ([`mod@broker_api`]): order flow, assignment, disputes and expert statistics.
//!
//! The engine also emits events when orders are assigned or completed and when disputes are opened or resolved.
//! Subscribe to these with [`events::EventHooks`] to drive notification delivery without blocking the core flows.

pub mod broker_api;
pub mod db;
pub mod db_types;
pub mod events;
pub mod lifecycle;
pub mod matcher;

#[cfg(feature = "sqlite")]
pub use db::sqlite::SqliteDatabase;
pub use db::common::{BrokerDatabase, BrokerError, DisputeManagement, ExpertManagement};
pub use broker_api::{
    assignment_api::AssignmentApi,
    dispute_api::{CompensationPolicy, DisputeApi, LoggingPaymentGateway, PaymentGateway},
    order_flow_api::OrderFlowApi,
    order_objects,
    stats_api::StatisticsApi,
};
pub use lifecycle::{Actor, OrderEvent, Role};
