// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineError;
use crate::modules::taskqueue::model::TaskMeta;
use crate::modules::taskqueue::result::TaskResult;
use crate::modules::taskqueue::task::Task;
use crate::{raise_error, utc_now};
use ahash::AHashMap;
use std::time::Instant;
use std::{future::Future, pin::Pin, sync::Arc};
use tracing::{error, info, warn};

pub type Handler = Arc<
    dyn Fn(String, u64) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send>>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub struct TaskHandlers {
    handlers: AHashMap<String, Handler>,
}

impl TaskHandlers {
    pub fn new() -> Self {
        Self {
            handlers: AHashMap::new(),
        }
    }

    pub fn register<T>(&mut self)
    where
        T: Task,
    {
        self.handlers.insert(
            T::TASK_KEY.to_owned(),
            Arc::new(|params, task_id| process::<T>(params, task_id)),
        );
    }

    pub async fn execute(&self, task_meta: TaskMeta) -> TaskResult {
        let task_id = task_meta.id;
        let task_key = task_meta.task_key.clone();
        let retry_policy = task_meta.retry_policy();
        let attempts = task_meta.retry_count.unwrap_or(0);

        let execution_future = async move {
            let handler_option = self
                .handlers
                .get(&task_key)
                .map(|handler| execute(handler.clone(), Arc::new(task_meta.clone())));

            let mut result = if let Some(execution_future) = handler_option {
                execution_future.await
            } else {
                error!("Unrecognized Task '{task_key}'. This error should not occur; it may indicate that the task has not been registered by the developer.");
                TaskResult::failure(
                    task_id,
                    raise_error!(
                        "Unrecognized task type for the client".into(),
                        ErrorCode::InternalError
                    ),
                    0,
                )
            };

            if result.is_success() {
                return result;
            }
            result.retry_count = attempts + 1;

            if let Some(max) = retry_policy.max_retries {
                if result.retry_count >= (max as usize) {
                    warn!(
                        "Task {} has exceeded the maximum retry attempts of {}",
                        task_id, max
                    );
                    return result;
                }
            }
            let wait = retry_policy.wait_time((attempts + 1) as u32);
            result.next_run = Some(utc_now!() + (wait * 1000) as i64);
            result
        };
        execution_future.await
    }
}

pub fn process<T>(
    params: String,
    task_id: u64,
) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send>>
where
    T: Task,
{
    Box::pin(async move {
        let task = serde_json::from_str::<T>(params.as_str())
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        task.run(task_id).await
    })
}

async fn execute(handler: Handler, task_meta: Arc<TaskMeta>) -> TaskResult {
    let task_name = task_meta.task_key.clone();
    let task_queue = task_meta.queue_name.clone();
    let start = Instant::now();
    let task_params = task_meta.task_params.clone();
    let task_id = task_meta.id;
    let task_future = tokio::spawn(async move { (handler)(task_params, task_id).await });
    match task_future.await {
        Ok(Ok(_)) => {
            let duration = start.elapsed();
            info!(
                "Task '{{{task_name}-{task_id}}}' in queue '{task_queue}' executed successfully, took {:?}",
                duration
            );
            TaskResult::success(task_meta.id, duration.as_millis() as usize)
        }
        Ok(Err(e)) => {
            let duration = start.elapsed();
            warn!("Task '{{{task_name}-{task_id}}}' in queue '{task_queue}' errored, {e:#?}");
            TaskResult::failure(task_meta.id, e, duration.as_millis() as usize)
        }
        Err(e) if e.is_panic() => {
            let duration = start.elapsed();
            warn!("Task '{{{task_name}-{task_id}}}' in queue '{task_queue}' panicked");
            TaskResult::failure(
                task_meta.id,
                raise_error!("Task panicked".into(), ErrorCode::InternalError),
                duration.as_millis() as usize,
            )
        }
        Err(e) => {
            warn!(
                "Task '{{{task_name}}}' in queue '{task_queue}' failed unexpectedly: {:?}",
                e
            );
            let duration = start.elapsed();
            TaskResult::failure(
                task_id,
                raise_error!(
                    format!("task failed unexpectedly: {:?}", e),
                    ErrorCode::InternalError
                ),
                duration.as_millis() as usize,
            )
        }
    }
}
