// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! `NotificationDispatcher` (spec §4.7, C8): on Finalize, render and enqueue
//! a webhook delivery for subscribers watching the resulting status.

use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::secondary_find_impl;
use crate::modules::email::message::EmailStatus;
use crate::modules::error::EngineResult;
use crate::modules::notify::entity::{WebhookConfig, WebhookConfigKey};
use crate::modules::notify::task::WebhookDeliveryTask;
use crate::modules::taskqueue::queue::ENGINE_TASKS;
use tracing::debug;

pub struct NotificationDispatcher;

impl NotificationDispatcher {
    /// `color` per SPEC_FULL §D.3: `SUCCESS` → green, `FAILED` → red, any
    /// `*_PROCESSING` state → blue.
    fn color_for(status: &EmailStatus) -> &'static str {
        if matches!(status, EmailStatus::Success) {
            "green"
        } else if matches!(status, EmailStatus::Failed) {
            "red"
        } else if status.is_processing() {
            "blue"
        } else {
            "gray"
        }
    }

    /// Renders and submits one webhook delivery, if the user has a webhook
    /// configured, enabled, and subscribed to `new_status`. Never fails the
    /// caller's workflow run: delivery itself is handled by the task queue's
    /// own retry policy, and a missing/unsubscribed webhook is simply a
    /// no-op here.
    pub async fn dispatch(
        user_id: u64,
        email_id: u64,
        subject: &str,
        old_status: EmailStatus,
        new_status: EmailStatus,
    ) -> EngineResult<()> {
        let config: Option<WebhookConfig> =
            secondary_find_impl(DB_MANAGER.meta_db(), WebhookConfigKey::user_id, user_id).await?;
        let Some(config) = config else {
            return Ok(());
        };
        if !config.enabled {
            return Ok(());
        }
        let status_key = new_status.to_string();
        if !config.events.iter().any(|e| e == &status_key) {
            debug!(user_id, email_id, %status_key, "webhook not subscribed to this status, skipping");
            return Ok(());
        }

        let title = format!("[{}] {}", status_key, subject);
        let markdown = format!(
            "Email `{}` transitioned from `{}` to `{}`.",
            email_id, old_status, new_status
        );
        let task = WebhookDeliveryTask {
            user_id,
            url: config.url.clone(),
            title,
            markdown,
            color: Self::color_for(&new_status).to_string(),
            timeout_secs: config.timeout_secs,
        };

        if let Err(e) = ENGINE_TASKS.get()?.submit_task(task, None).await {
            debug!(user_id, email_id, "failed to enqueue webhook delivery: {:#?}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::database::insert_impl;
    use crate::id;

    #[test]
    fn color_for_matches_spec_d3() {
        assert_eq!(NotificationDispatcher::color_for(&EmailStatus::Success), "green");
        assert_eq!(NotificationDispatcher::color_for(&EmailStatus::Failed), "red");
        assert_eq!(NotificationDispatcher::color_for(&EmailStatus::OcrProcessing), "blue");
        assert_eq!(NotificationDispatcher::color_for(&EmailStatus::Fetched), "gray");
    }

    #[tokio::test]
    async fn dispatch_is_a_no_op_with_no_webhook_configured() {
        let user_id = id!(64);
        let outcome = NotificationDispatcher::dispatch(user_id, id!(64), "subject", EmailStatus::Processing, EmailStatus::Success).await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn dispatch_is_a_no_op_when_the_webhook_is_disabled() {
        let mut config = WebhookConfig::new(id!(64), "https://hooks.example.com/x".to_string());
        config.enabled = false;
        let user_id = config.user_id;
        insert_impl(DB_MANAGER.meta_db(), config).await.unwrap();

        let outcome = NotificationDispatcher::dispatch(user_id, id!(64), "subject", EmailStatus::Processing, EmailStatus::Success).await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn dispatch_is_a_no_op_when_not_subscribed_to_the_new_status() {
        let mut config = WebhookConfig::new(id!(64), "https://hooks.example.com/y".to_string());
        config.events = vec!["failed".to_string()];
        let user_id = config.user_id;
        insert_impl(DB_MANAGER.meta_db(), config).await.unwrap();

        // ENGINE_TASKS is never initialized in this test binary; reaching the
        // submit_task() call below would turn this `Ok` into an `Err`.
        let outcome = NotificationDispatcher::dispatch(user_id, id!(64), "subject", EmailStatus::Processing, EmailStatus::Success).await;
        assert!(outcome.is_ok());
    }
}
