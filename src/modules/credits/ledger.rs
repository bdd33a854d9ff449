// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::id;
use crate::modules::credits::entity::{
    CreditsTxnType, EmailCreditsTxn, EmailCreditsTxnKey, GeneralCreditsTxn, GeneralCreditsTxnKey,
    UserCredits, UserCreditsKey,
};
use crate::modules::database::{async_find_impl, secondary_find_impl};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineResult;
use crate::modules::user::entity::{Plan, Subscription, SubscriptionStatus};
use crate::{after_n_days_timestamp, raise_error, utc_now};
use native_db::Database;
use std::sync::Arc;
use tracing::{info, warn};

/// The ledger named by spec §4.3: atomic, idempotent consume/refund against
/// per-user monthly quota windows. `consume`/`refund` each open exactly one
/// `native_db` write transaction spanning the `UserCredits` row and the txn
/// row it inserts, giving the "relative-delta update + idempotency insert in
/// one commit" guarantee the spec's `SELECT ... FOR UPDATE` pseudocode asks
/// for (see [`crate::modules::database::update_impl`]'s doc comment).
pub struct CreditsLedger;

impl CreditsLedger {
    /// Non-locking read: `true` if the user's current balance covers `n`.
    pub async fn check(
        database: &Arc<Database<'static>>,
        user_id: u64,
        n: u64,
    ) -> EngineResult<bool> {
        let credits = Self::load(database, user_id).await?;
        Ok(credits.available() >= n as i64)
    }

    pub async fn load(
        database: &Arc<Database<'static>>,
        user_id: u64,
    ) -> EngineResult<UserCredits> {
        secondary_find_impl::<UserCredits>(database, UserCreditsKey::user_id, user_id)
            .await?
            .ok_or_else(|| {
                raise_error!(
                    format!("no UserCredits row for user {}", user_id),
                    ErrorCode::DataIntegrityError
                )
            })
    }

    /// Fails with `InsufficientCredits` when `available < n`. Replaying the
    /// same `idempotency_key` is a no-op that returns the original txn.
    pub async fn consume(
        database: &Arc<Database<'static>>,
        user_id: u64,
        n: u64,
        reason: &str,
        idempotency_key: &str,
        email_message_id: u64,
    ) -> EngineResult<EmailCreditsTxn> {
        if let Some(existing) = Self::find_email_txn(database, idempotency_key).await? {
            return Ok(existing);
        }

        let db = database.clone();
        let reason = reason.to_string();
        let idempotency_key = idempotency_key.to_string();
        let now = utc_now!();
        tokio::task::spawn_blocking(move || {
            let rw = db
                .rw_transaction()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            let current: Option<UserCredits> = rw
                .get()
                .secondary(UserCreditsKey::user_id, user_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            let current = current.ok_or_else(|| {
                raise_error!(
                    format!("no UserCredits row for user {}", user_id),
                    ErrorCode::DataIntegrityError
                )
            })?;
            if current.available() < n as i64 {
                warn!(
                    user_id,
                    n, available = current.available(), "InsufficientCredits on consume"
                );
                return Err(raise_error!(
                    format!(
                        "InsufficientCredits: user {} has {} available, needs {}",
                        user_id,
                        current.available(),
                        n
                    ),
                    ErrorCode::InsufficientCredits
                ));
            }
            let mut updated = current.clone();
            updated.consumed_credits += n;
            rw.update(current, updated)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;

            let txn = EmailCreditsTxn {
                id: id!(64),
                user_id,
                email_message_id,
                txn_type: CreditsTxnType::Consume,
                amount: n,
                reason,
                idempotency_key,
                created_at: now,
            };
            rw.insert(txn.clone())
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            rw.commit()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            info!(user_id, n, "credits consumed");
            Ok(txn)
        })
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
    }

    /// Idempotent reversal keyed `refund_<txn_id>`; replaying is a no-op.
    pub async fn refund(
        database: &Arc<Database<'static>>,
        txn_id: u64,
    ) -> EngineResult<EmailCreditsTxn> {
        let original = async_find_impl::<EmailCreditsTxn>(database, txn_id)
            .await?
            .ok_or_else(|| {
                raise_error!(
                    format!("no EmailCreditsTxn row for id {}", txn_id),
                    ErrorCode::ResourceNotFound
                )
            })?;

        let refund_key = format!("refund_{}", txn_id);
        if let Some(existing) = Self::find_email_txn(database, &refund_key).await? {
            return Ok(existing);
        }

        let db = database.clone();
        let user_id = original.user_id;
        let amount = original.amount;
        let email_message_id = original.email_message_id;
        let reason = format!("refund of txn {}", txn_id);
        let now = utc_now!();
        tokio::task::spawn_blocking(move || {
            let rw = db
                .rw_transaction()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            let current: Option<UserCredits> = rw
                .get()
                .secondary(UserCreditsKey::user_id, user_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            let current = current.ok_or_else(|| {
                raise_error!(
                    format!("no UserCredits row for user {}", user_id),
                    ErrorCode::DataIntegrityError
                )
            })?;
            let mut updated = current.clone();
            updated.consumed_credits = updated.consumed_credits.saturating_sub(amount);
            rw.update(current, updated)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;

            let txn = EmailCreditsTxn {
                id: id!(64),
                user_id,
                email_message_id,
                txn_type: CreditsTxnType::Refund,
                amount,
                reason,
                idempotency_key: refund_key,
                created_at: now,
            };
            rw.insert(txn.clone())
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            rw.commit()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            Ok(txn)
        })
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
    }

    /// Manual bonus/compensation grant, carrying operator attribution
    /// (SPEC_FULL §B). Idempotent on `idempotency_key` like `consume`.
    pub async fn grant_bonus(
        database: &Arc<Database<'static>>,
        user_id: u64,
        n: u64,
        reason: &str,
        operator_id: Option<u64>,
        idempotency_key: &str,
    ) -> EngineResult<GeneralCreditsTxn> {
        if let Some(existing) = secondary_find_impl::<GeneralCreditsTxn>(
            database,
            GeneralCreditsTxnKey::idempotency_key,
            idempotency_key.to_string(),
        )
        .await?
        {
            return Ok(existing);
        }

        let db = database.clone();
        let reason = reason.to_string();
        let idempotency_key = idempotency_key.to_string();
        let now = utc_now!();
        tokio::task::spawn_blocking(move || {
            let rw = db
                .rw_transaction()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            let current: Option<UserCredits> = rw
                .get()
                .secondary(UserCreditsKey::user_id, user_id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            let current = current.ok_or_else(|| {
                raise_error!(
                    format!("no UserCredits row for user {}", user_id),
                    ErrorCode::DataIntegrityError
                )
            })?;
            let mut updated = current.clone();
            updated.bonus_credits += n;
            rw.update(current, updated)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;

            let txn = GeneralCreditsTxn {
                id: id!(64),
                user_id,
                operator_id,
                amount: n,
                reason,
                idempotency_key,
                created_at: now,
            };
            rw.insert(txn.clone())
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            rw.commit()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            Ok(txn)
        })
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
    }

    /// Driven daily by the scheduler (spec §4.3/§4.6.4): resets `consumed` to
    /// zero, `base` to `plan.credits_per_period`, and shifts the period
    /// window forward by `plan.period_days`, for every row whose period has
    /// elapsed and whose subscription is still active.
    pub async fn reset_period(
        database: &Arc<Database<'static>>,
        user_credits: &UserCredits,
        plan: &Plan,
    ) -> EngineResult<()> {
        let db = database.clone();
        let id = user_credits.id;
        let base = plan.credits_per_period;
        let period_days = plan.period_days;
        tokio::task::spawn_blocking(move || {
            let rw = db
                .rw_transaction()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            let current: Option<UserCredits> = rw
                .get()
                .primary(id)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            let current = current.ok_or_else(|| {
                raise_error!(
                    format!("no UserCredits row for id {}", id),
                    ErrorCode::DataIntegrityError
                )
            })?;
            let mut updated = current.clone();
            updated.consumed_credits = 0;
            updated.base_credits = base;
            updated.period_start = current.period_end;
            updated.period_end = after_n_days_timestamp!(current.period_end, period_days);
            rw.update(current, updated)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            rw.commit()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            Ok(())
        })
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
    }

    async fn find_email_txn(
        database: &Arc<Database<'static>>,
        idempotency_key: &str,
    ) -> EngineResult<Option<EmailCreditsTxn>> {
        secondary_find_impl::<EmailCreditsTxn>(
            database,
            EmailCreditsTxnKey::idempotency_key,
            idempotency_key.to_string(),
        )
        .await
    }

    /// For subscriptions `past_due` beyond the grace period on a paid plan:
    /// cancel the current subscription and create a free one (spec §4.3,
    /// a distinct daily task from renewal). Returns the new `Subscription`.
    pub async fn downgrade_to_free(
        database: &Arc<Database<'static>>,
        subscription: &Subscription,
        free_plan_id: u64,
    ) -> EngineResult<Subscription> {
        let db = database.clone();
        let current = subscription.clone();
        let now = utc_now!();
        tokio::task::spawn_blocking(move || {
            let rw = db
                .rw_transaction()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            // `user_id` is a unique secondary key, so the old row has to be
            // gone before the replacement can be inserted under the same id.
            rw.remove(current.clone())
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;

            let new_sub = Subscription {
                id: id!(64),
                user_id: current.user_id,
                plan_id: free_plan_id,
                status: SubscriptionStatus::Active,
                past_due_since: None,
                created_at: now,
                updated_at: now,
            };
            rw.insert(new_sub.clone())
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            rw.commit()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            Ok(new_sub)
        })
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
    }
}
