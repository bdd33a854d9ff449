// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! The five periodic sweeps behind spec §4.6: fetch, processing dispatch,
//! stuck-task reaper, credit renewal, plan downgrade. Each runs as its own
//! [`crate::modules::taskqueue::periodic::PeriodicTask`] on its own
//! settings-configured cadence rather than one shared one-minute tick,
//! since the jobs already have independent cadences in [`crate::modules::settings::Settings`].

use crate::modules::credits::ledger::CreditsLedger;
use crate::modules::database::{
    async_find_impl, batch_update_impl, filter_by_secondary_key_impl, list_all_impl, manager::DB_MANAGER,
    secondary_find_impl,
};
use crate::modules::email::message::{EmailMessage, EmailMessageKey, EmailStatus};
use crate::modules::email::task_trace::{EmailTask, EmailTaskType};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineResult;
use crate::modules::locks;
use crate::modules::mailsource;
use crate::modules::scheduler::task::{self, FetchUserEmailsTask};
use crate::modules::settings::SETTINGS;
use crate::modules::taskqueue::queue::EngineTaskQueue;
use crate::modules::user::entity::{EmailConfigMode, Plan, Subscription, SubscriptionKey, SubscriptionStatus, User};
use crate::modules::workflow::task::EmailWorkflowTask;
use crate::{id, utc_now};
use itertools::Itertools;
use tracing::{info, warn};

/// Sweeps the filesystem drop-box (every user at once) then queues one
/// [`FetchUserEmailsTask`] per enabled `CustomImap` user under its
/// single-flight lock (spec §4.1, §4.6.1).
pub async fn fetch_tick(_: Option<u64>) -> EngineResult<()> {
    match mailsource::filesystem::scan(&SETTINGS.dropbox_dir).await {
        Ok(matches) => {
            let mut persisted = 0u64;
            for matched in matches {
                if mailsource::persist(matched.user_id, matched.email).await?.is_some() {
                    persisted += 1;
                }
            }
            if persisted > 0 {
                info!("dropbox sweep persisted {} new messages", persisted);
            }
        }
        Err(e) => warn!("dropbox sweep failed: {:#?}", e),
    }

    let users = list_all_impl::<User>(DB_MANAGER.meta_db()).await?;
    let queue = EngineTaskQueue::get()?;
    for user in users {
        if !user.enabled || user.email_config.mode != EmailConfigMode::CustomImap {
            continue;
        }
        let lock_token = id!(64).to_string();
        match locks::acquire(
            DB_MANAGER.meta_db(),
            &task::lock_key(user.id),
            SETTINGS.stuck_task_timeout_secs as i64,
            &lock_token,
        )
        .await
        {
            Ok(()) => {
                let submitted = queue
                    .submit_task(FetchUserEmailsTask { user_id: user.id, lock_token: lock_token.clone() }, None)
                    .await;
                if let Err(e) = submitted {
                    warn!(user_id = user.id, "failed to submit fetch task: {:#?}", e);
                    let _ = locks::release(DB_MANAGER.meta_db(), &task::lock_key(user.id), &lock_token).await;
                }
            }
            Err(_) => {
                // Another fetch for this user is already in flight; skip this tick.
            }
        }
    }
    Ok(())
}

/// Queues one [`EmailWorkflowTask`] per `EmailMessage` still sitting in
/// `Fetched` (spec §4.6.2). Concurrency is bounded by the workflow queue's
/// own `set_concurrency`, not by this sweep.
pub async fn dispatch_tick(_: Option<u64>) -> EngineResult<()> {
    let fetched = filter_by_secondary_key_impl::<EmailMessage>(
        DB_MANAGER.meta_db(),
        EmailMessageKey::status_code,
        EmailStatus::Fetched.code(),
    )
    .await?;

    if fetched.is_empty() {
        return Ok(());
    }

    let queue = EngineTaskQueue::get()?;
    let mut dispatched = 0u64;
    for email in fetched {
        match queue.submit_task(EmailWorkflowTask { email_id: email.id, force: false }, None).await {
            Ok(()) => dispatched += 1,
            Err(e) => warn!(email_id = email.id, "failed to submit workflow task: {:#?}", e),
        }
    }
    info!("dispatch tick queued {} workflow runs", dispatched);
    Ok(())
}

/// Resets any `EmailMessage` wedged in a `*_Processing` state past
/// `stuck_task_timeout_secs` back to `Fetched`, so the next dispatch tick
/// picks it up again (spec §4.5 "Retries", §4.6.3).
pub async fn reaper_tick(_: Option<u64>) -> EngineResult<()> {
    let trace = EmailTask::start(None, EmailTaskType::StuckReaper).persist().await?;
    let threshold = utc_now!() - (SETTINGS.stuck_task_timeout_secs as i64 * 1000);

    let reset = batch_update_impl::<EmailMessage>(
        DB_MANAGER.meta_db(),
        move |rw| {
            let stuck: Vec<EmailMessage> = rw
                .scan()
                .primary()
                .map_err(|e| crate::raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .all()
                .map_err(|e| crate::raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                .try_collect()
                .map_err(|e| crate::raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
            Ok(stuck
                .into_iter()
                .filter(|m| m.status.is_processing() && m.updated_at < threshold)
                .collect())
        },
        |targets: &Vec<EmailMessage>| {
            Ok(targets
                .iter()
                .map(|m| {
                    let mut reset = m.clone();
                    reset.status = EmailStatus::Fetched;
                    reset.updated_at = utc_now!();
                    (m.clone(), reset)
                })
                .collect())
        },
    )
    .await?;

    if !reset.is_empty() {
        warn!("stuck-task reaper reset {} wedged email runs", reset.len());
    }
    trace.complete(reset.len() as u64).finish().await?;
    Ok(())
}

/// Rolls every elapsed `UserCredits` period forward for actively-subscribed
/// users (spec §4.3, §4.6.4).
pub async fn renewal_tick(_: Option<u64>) -> EngineResult<()> {
    let trace = EmailTask::start(None, EmailTaskType::CreditRenewal).persist().await?;
    let now = utc_now!();
    let all_credits = list_all_impl::<crate::modules::credits::entity::UserCredits>(DB_MANAGER.meta_db()).await?;

    let mut renewed = 0u64;
    for credits in all_credits {
        if credits.period_end > now {
            continue;
        }
        let Some(subscription) =
            secondary_find_impl::<Subscription>(DB_MANAGER.meta_db(), SubscriptionKey::user_id, credits.user_id).await?
        else {
            continue;
        };
        if subscription.status != SubscriptionStatus::Active {
            continue;
        }
        let Some(plan) = async_find_impl::<Plan>(DB_MANAGER.meta_db(), subscription.plan_id).await? else {
            warn!(user_id = credits.user_id, "subscription references a missing plan, skipping renewal");
            continue;
        };
        CreditsLedger::reset_period(DB_MANAGER.meta_db(), &credits, &plan).await?;
        renewed += 1;
    }
    trace.complete(renewed).finish().await?;
    Ok(())
}

/// Cancels any `PastDue` subscription that has sat past `downgrade_grace_days`
/// on a paid plan and replaces it with a free one (spec §4.3, §4.6.5).
pub async fn downgrade_tick(_: Option<u64>) -> EngineResult<()> {
    let trace = EmailTask::start(None, EmailTaskType::PlanDowngrade).persist().await?;

    let plans = list_all_impl::<Plan>(DB_MANAGER.meta_db()).await?;
    let Some(free_plan) = plans.iter().find(|p| p.is_free) else {
        warn!("no free plan configured; skipping downgrade sweep");
        trace.fail("no free plan configured".to_string()).finish().await?;
        return Ok(());
    };

    let grace_ms = SETTINGS.downgrade_grace_days * 86_400_000;
    let now = utc_now!();
    let subscriptions = list_all_impl::<Subscription>(DB_MANAGER.meta_db()).await?;

    let mut downgraded = 0u64;
    for subscription in subscriptions {
        if subscription.status != SubscriptionStatus::PastDue {
            continue;
        }
        let Some(since) = subscription.past_due_since else {
            continue;
        };
        if now - since < grace_ms {
            continue;
        }
        if let Err(e) = CreditsLedger::downgrade_to_free(DB_MANAGER.meta_db(), &subscription, free_plan.id).await {
            warn!(user_id = subscription.user_id, "downgrade failed: {:#?}", e);
            continue;
        }
        downgraded += 1;
    }
    trace.complete(downgraded).finish().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::credits::entity::UserCredits;
    use crate::modules::database::secondary_find_impl;

    async fn seed_email(status: EmailStatus, updated_at: i64) -> EmailMessage {
        let mut email = EmailMessage::new(
            id!(64),
            format!("email_{}", id!(64)),
            "subject".to_string(),
            "sender@example.com".to_string(),
            vec!["support@example.com".to_string()],
            utc_now!(),
            "raw".to_string(),
            None,
            None,
        );
        email.status = status;
        email.updated_at = updated_at;
        insert_impl(DB_MANAGER.meta_db(), email.clone()).await.unwrap();
        email
    }

    /// Spec §8 S4: a run wedged in a `*_Processing` state past
    /// `stuck_task_timeout_secs` is reset back to `Fetched` by the reaper.
    #[tokio::test]
    async fn reaper_tick_resets_a_wedged_run_back_to_fetched() {
        let stale = utc_now!() - (SETTINGS.stuck_task_timeout_secs as i64 * 1000) - 60_000;
        let wedged = seed_email(EmailStatus::LlmEmailProcessing, stale).await;

        reaper_tick(None).await.unwrap();

        let reset = async_find_impl::<EmailMessage>(DB_MANAGER.meta_db(), wedged.id).await.unwrap().unwrap();
        assert_eq!(reset.status, EmailStatus::Fetched);
    }

    #[tokio::test]
    async fn reaper_tick_leaves_a_fresh_processing_run_alone() {
        let fresh = seed_email(EmailStatus::OcrProcessing, utc_now!()).await;

        reaper_tick(None).await.unwrap();

        let untouched = async_find_impl::<EmailMessage>(DB_MANAGER.meta_db(), fresh.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, EmailStatus::OcrProcessing);
    }

    #[tokio::test]
    async fn renewal_tick_rolls_an_elapsed_period_forward_for_an_active_subscription() {
        let user_id = id!(64);
        let now = utc_now!();
        let plan = Plan {
            id: id!(64),
            name: format!("plan-{user_id}"),
            is_free: false,
            credits_per_period: 500,
            period_days: 30,
            workflow_cost_credits: 1,
        };
        insert_impl(DB_MANAGER.meta_db(), plan.clone()).await.unwrap();
        let subscription = Subscription {
            id: id!(64),
            user_id,
            plan_id: plan.id,
            status: SubscriptionStatus::Active,
            past_due_since: None,
            created_at: now,
            updated_at: now,
        };
        insert_impl(DB_MANAGER.meta_db(), subscription).await.unwrap();
        let credits = UserCredits::new(user_id, None, 100, now - 31 * 86_400_000, now - 1000);
        let credits_id = credits.id;
        insert_impl(DB_MANAGER.meta_db(), credits).await.unwrap();

        renewal_tick(None).await.unwrap();

        let renewed = async_find_impl::<UserCredits>(DB_MANAGER.meta_db(), credits_id).await.unwrap().unwrap();
        assert_eq!(renewed.consumed_credits, 0);
        assert_eq!(renewed.base_credits, 500);
        assert!(renewed.period_end > now);
    }

    #[tokio::test]
    async fn downgrade_tick_cancels_a_past_due_subscription_past_the_grace_period() {
        let user_id = id!(64);
        let now = utc_now!();
        let free_plan = Plan {
            id: id!(64),
            name: format!("free-{user_id}"),
            is_free: true,
            credits_per_period: 10,
            period_days: 30,
            workflow_cost_credits: 1,
        };
        insert_impl(DB_MANAGER.meta_db(), free_plan).await.unwrap();
        let paid_plan = Plan {
            id: id!(64),
            name: format!("paid-{user_id}"),
            is_free: false,
            credits_per_period: 500,
            period_days: 30,
            workflow_cost_credits: 1,
        };
        insert_impl(DB_MANAGER.meta_db(), paid_plan.clone()).await.unwrap();
        let grace_ms = SETTINGS.downgrade_grace_days * 86_400_000;
        let subscription = Subscription {
            id: id!(64),
            user_id,
            plan_id: paid_plan.id,
            status: SubscriptionStatus::PastDue,
            past_due_since: Some(now - grace_ms - 60_000),
            created_at: now,
            updated_at: now,
        };
        insert_impl(DB_MANAGER.meta_db(), subscription).await.unwrap();

        downgrade_tick(None).await.unwrap();

        let current = secondary_find_impl::<Subscription>(DB_MANAGER.meta_db(), SubscriptionKey::user_id, user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.status, SubscriptionStatus::Active);
        assert_ne!(current.plan_id, paid_plan.id);
    }
}
