#![allow(dead_code)]

pub mod prepare_env;

use chrono::{Duration, Utc};
use ewb_common::Money;
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};
use work_broker_engine::{
    db_types::{NewOrder, NewSpecialization, OrderId},
    BrokerDatabase,
    ExpertManagement,
    SqliteDatabase,
};

pub async fn setup_db() -> SqliteDatabase {
    let url = prepare_env::random_db_path();
    prepare_env::prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 10).await.expect("Error creating database")
}

pub async fn tear_down(mut db: SqliteDatabase) {
    let url = db.url().to_string();
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

/// A week-out Mathematics order: the standard fixture for claim and lifecycle tests.
pub fn math_order(order_id: &str, client_id: i64, budget_dollars: i64) -> NewOrder {
    NewOrder::new(
        OrderId::from(order_id.to_string()),
        client_id,
        Money::from_dollars(budget_dollars),
        Utc::now() + Duration::days(7),
    )
    .with_subject("Mathematics")
}

pub async fn seed_expert(db: &SqliteDatabase, expert_id: i64, subject: &str, experience_years: i64) {
    db.upsert_specialization(
        NewSpecialization::new(expert_id, subject)
            .verified()
            .with_experience(experience_years)
            .with_hourly_rate(Money::from_dollars(35)),
    )
    .await
    .expect("Error seeding specialization");
}
