// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineResult;
use crate::modules::taskqueue::model::TaskMeta;
use crate::modules::taskqueue::retry::{RetryPolicy, RetryStrategy};
use crate::raise_error;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::pin::Pin;

pub type TaskFuture = Pin<Box<dyn Future<Output = EngineResult<()>> + Send>>;

pub trait Task: Serialize + DeserializeOwned + 'static {
    /// A unique identifier for this task type, used to route a stored row to its handler.
    const TASK_KEY: &'static str;

    /// The queue this task runs on. Queues have independent concurrency limits.
    const TASK_QUEUE: &'static str;

    /// Default: exponential backoff with base 2, up to 3 retries.
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            strategy: RetryStrategy::Exponential { base: 2 },
            max_retries: Some(3),
        }
    }

    /// Delay in seconds before the first execution attempt.
    fn delay_seconds(&self) -> u32 {
        3
    }

    fn run(self, task_id: u64) -> TaskFuture;

    fn validate(&self) -> EngineResult<()> {
        if Self::TASK_QUEUE.is_empty() {
            return Err(raise_error!(
                "TASK_QUEUE must not be empty.".into(),
                ErrorCode::InternalError
            ));
        }
        Ok(())
    }

    fn new_meta(&self) -> TaskMeta {
        self.validate().unwrap_or_else(|err| {
            panic!(
                "Validation failed for task '{}': {}. This indicates a programming error.",
                Self::TASK_KEY,
                err
            )
        });

        TaskMeta::new(
            Self::TASK_KEY.to_owned(),
            serde_json::to_string(&self).expect(
                "Serialization failed: this should never happen if all fields are serializable",
            ),
            Self::TASK_QUEUE.to_owned(),
            self.retry_policy(),
            self.delay_seconds(),
        )
    }
}
