// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineResult;
use crate::modules::settings::SETTINGS;
use crate::modules::taskqueue::retry::{RetryPolicy, RetryStrategy};
use crate::modules::taskqueue::task::{Task, TaskFuture};
use crate::raise_error;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

pub const WEBHOOK_QUEUE: &str = "webhook_delivery";

/// One outbound notification POST (spec §4.7, C8). Carries its own rendered
/// payload rather than re-deriving it from the email row at run time, so a
/// retried delivery sends byte-identical content even if the email has since
/// changed state further.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebhookDeliveryTask {
    pub user_id: u64,
    pub url: String,
    pub title: String,
    pub markdown: String,
    pub color: String,
    pub timeout_secs: u64,
}

#[derive(Serialize)]
struct CardPayload<'a> {
    title: &'a str,
    markdown: &'a str,
    color: &'a str,
}

impl Task for WebhookDeliveryTask {
    const TASK_KEY: &'static str = "webhook_delivery";
    const TASK_QUEUE: &'static str = WEBHOOK_QUEUE;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            strategy: RetryStrategy::Exponential { base: 2 },
            max_retries: Some(3),
        }
    }

    fn delay_seconds(&self) -> u32 {
        0
    }

    fn run(self, _task_id: u64) -> TaskFuture {
        Box::pin(async move {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(
                    self.timeout_secs.min(SETTINGS.http_timeout_secs),
                ))
                .build()
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;

            let payload = CardPayload {
                title: &self.title,
                markdown: &self.markdown,
                color: &self.color,
            };

            let response = client
                .post(&self.url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    warn!(user_id = self.user_id, "webhook POST to {} failed: {:#?}", self.url, e);
                    raise_error!(format!("{:#?}", e), ErrorCode::WebhookDeliveryFailed)
                })?;

            if !response.status().is_success() {
                return Err(raise_error!(
                    format!("webhook endpoint returned status {}", response.status()),
                    ErrorCode::WebhookDeliveryFailed
                ));
            }
            Ok(())
        })
    }
}
