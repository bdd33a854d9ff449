// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! The process-wide task queue: one [`TaskContext`] wired up with every
//! concrete [`Task`] this engine runs, grounded on the teacher's
//! `tasks::queue::RustMailerTaskQueue` singleton.

use crate::modules::context::Initialize;
use crate::modules::database::manager::DB_MANAGER;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineResult;
use crate::modules::notify::task::{WebhookDeliveryTask, WEBHOOK_QUEUE};
use crate::modules::settings::SETTINGS;
use crate::modules::taskqueue::context::TaskContext;
use crate::modules::taskqueue::nativedb::meta::NativeDbTaskStore;
use crate::modules::taskqueue::task::Task;
use crate::raise_error;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;

pub static ENGINE_TASKS: OnceLock<EngineTaskQueue> = OnceLock::new();

pub struct EngineTaskQueue {
    context: Arc<RwLock<TaskContext<NativeDbTaskStore>>>,
}

impl Initialize for EngineTaskQueue {
    async fn initialize() -> EngineResult<()> {
        let queue = EngineTaskQueue::new().await;
        let _ = ENGINE_TASKS.set(queue);
        Ok(())
    }
}

impl EngineTaskQueue {
    pub fn get() -> EngineResult<&'static EngineTaskQueue> {
        ENGINE_TASKS
            .get()
            .ok_or_else(|| raise_error!("task queue not initialized".into(), ErrorCode::InternalError))
    }

    async fn new() -> Self {
        let store = Arc::new(NativeDbTaskStore::init(DB_MANAGER.tasks_db().clone()));
        let context = TaskContext::with_arc_store(store)
            .register::<WebhookDeliveryTask>()
            .set_concurrency(WEBHOOK_QUEUE, 4)
            .register::<crate::modules::workflow::task::EmailWorkflowTask>()
            .set_concurrency(
                crate::modules::workflow::task::EMAIL_WORKFLOW_QUEUE,
                SETTINGS.task_worker_concurrency,
            )
            .register::<crate::modules::scheduler::task::FetchUserEmailsTask>()
            .set_concurrency(crate::modules::scheduler::task::FETCH_QUEUE, 2)
            .start_with_cleaner()
            .await;
        EngineTaskQueue {
            context: Arc::new(RwLock::new(context)),
        }
    }

    pub async fn submit_task<T>(&self, task: T, delay_seconds: Option<u32>) -> EngineResult<()>
    where
        T: Task + Send + Sync + 'static,
    {
        let context = self.context.read().await;
        context
            .add_task(task, delay_seconds)
            .await
            .map_err(|message| raise_error!(message, ErrorCode::InternalError))
    }

    pub async fn submit_tasks<T>(&self, tasks: &[T], delay_seconds: Option<u32>) -> EngineResult<()>
    where
        T: Task + Send + Sync + 'static,
    {
        let context = self.context.read().await;
        context
            .add_tasks(tasks, delay_seconds)
            .await
            .map_err(|message| raise_error!(message, ErrorCode::InternalError))
    }

    pub async fn stop_task(&self, task_id: u64, reason: Option<String>) -> EngineResult<()> {
        let context = self.context.read().await;
        context
            .stop_task(task_id, reason)
            .await
            .map_err(|message| raise_error!(message, ErrorCode::InternalError))
    }
}
