// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::capability::llm::HttpLlmEngine;
use crate::modules::capability::ocr::HttpOcrEngine;
use crate::modules::settings::SETTINGS;
use crate::modules::taskqueue::retry::{RetryPolicy, RetryStrategy};
use crate::modules::taskqueue::task::{Task, TaskFuture};
use crate::modules::workflow::engine::{RunOptions, WorkflowEngine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const EMAIL_WORKFLOW_QUEUE: &str = "email_workflow";

/// One run of the seven-node pipeline against a single `EmailMessage`
/// (spec §4.5), submitted by the scheduler's processing-dispatch tick
/// (spec §4.6.2) or by a user-initiated re-run with `force=true`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmailWorkflowTask {
    pub email_id: u64,
    pub force: bool,
}

impl Task for EmailWorkflowTask {
    const TASK_KEY: &'static str = "email_workflow";
    const TASK_QUEUE: &'static str = EMAIL_WORKFLOW_QUEUE;

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
            let llm = Arc::new(HttpLlmEngine::new(SETTINGS.llm_endpoint.clone())?);
            let ocr = Arc::new(HttpOcrEngine::new(SETTINGS.ocr_endpoint.clone())?);
            let engine = WorkflowEngine::new(llm, ocr);
            engine.run(self.email_id, RunOptions::new(self.force)).await
        })
    }
}
