// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::credits::entity::UserCredits;
use crate::modules::credits::ledger::CreditsLedger;
use crate::modules::database::{insert_impl, META_MODELS};
use native_db::Builder;
use std::sync::Arc;

fn new_db() -> Arc<native_db::Database<'static>> {
    Arc::new(Builder::new().create_in_memory(&META_MODELS).unwrap())
}

#[tokio::test]
async fn consume_is_idempotent_on_replay() {
    let db = new_db();
    let credits = UserCredits::new(1, None, 5, 0, 30 * 86_400_000);
    insert_impl(&db, credits).await.unwrap();

    let first = CreditsLedger::consume(&db, 1, 1, "workflow", "email_abc_workflow_execution", 99)
        .await
        .unwrap();
    let second = CreditsLedger::consume(&db, 1, 1, "workflow", "email_abc_workflow_execution", 99)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    let balance = CreditsLedger::load(&db, 1).await.unwrap();
    assert_eq!(balance.consumed_credits, 1);
    assert_eq!(balance.available(), 4);
}

#[tokio::test]
async fn consume_fails_when_balance_insufficient() {
    let db = new_db();
    let credits = UserCredits::new(2, None, 0, 0, 30 * 86_400_000);
    insert_impl(&db, credits).await.unwrap();

    let result = CreditsLedger::consume(&db, 2, 1, "workflow", "email_xyz_workflow_execution", 1)
        .await;
    assert!(result.is_err());

    let balance = CreditsLedger::load(&db, 2).await.unwrap();
    assert_eq!(balance.consumed_credits, 0);
}

#[tokio::test]
async fn refund_reverses_a_consume_and_is_itself_idempotent() {
    let db = new_db();
    let credits = UserCredits::new(3, None, 5, 0, 30 * 86_400_000);
    insert_impl(&db, credits).await.unwrap();

    let txn = CreditsLedger::consume(&db, 3, 2, "workflow", "email_r_workflow_execution", 1)
        .await
        .unwrap();
    CreditsLedger::refund(&db, txn.id).await.unwrap();
    CreditsLedger::refund(&db, txn.id).await.unwrap();

    let balance = CreditsLedger::load(&db, 3).await.unwrap();
    assert_eq!(balance.consumed_credits, 0);
}
