// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::id;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// A user's metered balance against the current subscription period (spec §3).
/// `available = base_credits + bonus_credits - consumed_credits` must never
/// go negative after a committed transaction; enforced by
/// [`crate::modules::credits::ledger::CreditsLedger::consume`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 23, version = 1)]
#[native_db]
pub struct UserCredits {
    #[primary_key]
    pub id: u64,
    #[secondary_key(unique)]
    pub user_id: u64,
    pub subscription_id: Option<u64>,
    pub base_credits: u64,
    pub bonus_credits: u64,
    pub consumed_credits: u64,
    pub period_start: i64,
    pub period_end: i64,
    pub is_active: bool,
}

impl UserCredits {
    pub fn new(user_id: u64, subscription_id: Option<u64>, base_credits: u64, period_start: i64, period_end: i64) -> Self {
        UserCredits {
            id: id!(64),
            user_id,
            subscription_id,
            base_credits,
            bonus_credits: 0,
            consumed_credits: 0,
            period_start,
            period_end,
            is_active: true,
        }
    }

    pub fn available(&self) -> i64 {
        self.base_credits as i64 + self.bonus_credits as i64 - self.consumed_credits as i64
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum CreditsTxnType {
    Consume,
    Refund,
}

/// A single debit or credit against an email's workflow run (spec §3's
/// `EmailCreditsTxn`). `idempotency_key` is the sole correctness mechanism
/// for replay convergence (spec §4.3) and must be globally unique.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 24, version = 1)]
#[native_db]
pub struct EmailCreditsTxn {
    #[primary_key]
    pub id: u64,
    pub user_id: u64,
    pub email_message_id: u64,
    pub txn_type: CreditsTxnType,
    pub amount: u64,
    pub reason: String,
    #[secondary_key(unique)]
    pub idempotency_key: String,
    pub created_at: i64,
}


/// Manual bonus/compensation/grant transactions, carrying `operator_id` for
/// audit attribution (SPEC_FULL §B, ported from the original's
/// `assign_internal_plan` command).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 25, version = 1)]
#[native_db]
pub struct GeneralCreditsTxn {
    #[primary_key]
    pub id: u64,
    pub user_id: u64,
    pub operator_id: Option<u64>,
    pub amount: u64,
    pub reason: String,
    #[secondary_key(unique)]
    pub idempotency_key: String,
    pub created_at: i64,
}

