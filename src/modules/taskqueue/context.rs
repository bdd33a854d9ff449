// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::taskqueue::cleaner::TaskCleaner;
use crate::modules::taskqueue::flow::TaskFlow;
use crate::modules::taskqueue::handlers::TaskHandlers;
use crate::modules::taskqueue::store::TaskStore;
use crate::modules::taskqueue::task::Task;
use crate::modules::taskqueue::updater::TaskStatusUpdater;
use crate::utc_now;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct TaskContext<S>
where
    S: TaskStore + Send + Sync + Clone + 'static,
{
    queue_concurrency: DashMap<String, usize>,
    handlers: TaskHandlers,
    store: Arc<S>,
}

impl<S> TaskContext<S>
where
    S: TaskStore + Send + Sync + Clone + 'static,
{
    pub fn with_arc_store(store: Arc<S>) -> Self {
        Self {
            queue_concurrency: DashMap::new(),
            handlers: TaskHandlers::new(),
            store,
        }
    }

    pub fn register<T>(mut self) -> Self
    where
        T: Task,
    {
        self.handlers.register::<T>();
        self.queue_concurrency.insert(T::TASK_QUEUE.to_owned(), 4);
        self
    }

    pub fn set_concurrency(self, queue: &str, count: usize) -> Self {
        self.queue_concurrency.insert(queue.to_owned(), count);
        self
    }

    fn start_task_cleaner(&self) {
        let cleaner = TaskCleaner::new(self.store.clone());
        cleaner.start(Duration::from_secs(60 * 10));
    }

    async fn start_flow(&self) {
        let status_updater = Arc::new(TaskStatusUpdater::new(
            self.store.clone(),
            self.queue_concurrency.len(),
        ));

        let flow = Arc::new(TaskFlow::new(
            self.store.clone(),
            &self.queue_concurrency,
            Arc::new(self.handlers.clone()),
            status_updater,
        ));

        flow.start().await;
    }

    /// Starts the worker pool for every registered queue plus the background cleaner.
    pub async fn start_with_cleaner(self) -> Self {
        self.start_flow().await;
        self.start_task_cleaner();
        self
    }

    pub async fn add_task<T>(&self, task: T, delay_seconds: Option<u32>) -> Result<(), String>
    where
        T: Task + Send + Sync + 'static,
    {
        let mut task_meta = task.new_meta();
        let delay_seconds = delay_seconds.unwrap_or(task_meta.delay_seconds) * 1000;
        let next_run = utc_now!() + delay_seconds as i64;
        task_meta.next_run = next_run;
        self.store
            .store_task(task_meta)
            .await
            .map_err(|e| format!("{:#?}", e))
    }

    pub async fn add_tasks<T>(&self, tasks: &[T], delay_seconds: Option<u32>) -> Result<(), String>
    where
        T: Task + Send + Sync + 'static,
    {
        let task_metas = tasks
            .iter()
            .map(|t| {
                let mut task_meta = t.new_meta();
                let delay_ms = delay_seconds.unwrap_or(task_meta.delay_seconds) * 1000;
                task_meta.next_run = utc_now!() + delay_ms as i64;
                task_meta
            })
            .collect::<Vec<_>>();

        self.store
            .store_tasks(task_metas)
            .await
            .map_err(|e| format!("Failed to store tasks: {e:#?}"))
    }

    pub async fn stop_task(
        &self,
        task_id: u64,
        stop_reason: Option<String>,
    ) -> Result<(), String> {
        self.store
            .set_task_stopped(task_id, stop_reason)
            .await
            .map_err(|e| format!("{:#?}", e))
    }
}
