// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! `WorkflowEngine` (spec §4.5, C6): the driver that loads a run's state and
//! walks it through the seven nodes in [`super::nodes`]. Grounded on the
//! teacher's `scheduler::context::TaskContext` in spirit (one owner holding
//! the capabilities every unit of work needs) but far smaller, since a
//! workflow run has a fixed, linear node graph rather than an arbitrary
//! task registry.

use crate::modules::capability::{LlmEngine, OcrEngine};
use crate::modules::database::{async_find_impl, filter_by_secondary_key_impl, manager::DB_MANAGER};
use crate::modules::email::attachment::EmailAttachmentKey;
use crate::modules::email::message::EmailMessage;
use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineResult;
use crate::modules::issue::engine::IssueResult;
use crate::modules::issue::jira::{IssueTracker, JiraClient};
use crate::modules::settings::SETTINGS;
use crate::modules::user::entity::{JiraConfig, User};
use crate::modules::workflow::nodes::{self, WorkflowAttachment};
use crate::raise_error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Builds the [`IssueTracker`] a run's Issue node talks to, from that user's
/// `JiraConfig`. Indirected through [`WorkflowEngine`] the same way the LLM
/// and OCR engines are, so tests can swap in a fake tracker instead of
/// dialing a real JIRA Cloud instance (spec §8 S2).
pub type IssueTrackerFactory = dyn Fn(&JiraConfig) -> EngineResult<Box<dyn IssueTracker>> + Send + Sync;

fn default_issue_tracker_factory(jira_config: &JiraConfig) -> EngineResult<Box<dyn IssueTracker>> {
    let api_token = jira_config.api_token()?;
    let client = JiraClient::new(jira_config.url.clone(), jira_config.username.clone(), api_token)?;
    Ok(Box::new(client))
}

/// Run-level flags (spec §4.5's "Force-mode semantics"). `deadline` is the
/// wall-clock budget for the whole run; exceeding it leaves the row in
/// whatever `*_PROCESSING` state it was in, for the stuck-task reaper to
/// reset (spec §4.5 "Retries").
pub struct RunOptions {
    pub force: bool,
    pub deadline: Duration,
}

impl RunOptions {
    pub fn new(force: bool) -> Self {
        Self {
            force,
            deadline: Duration::from_secs(SETTINGS.stuck_task_timeout_secs),
        }
    }
}

/// The in-memory working set for one run. Node output (OCR/LLM text,
/// summary fields, the issue result) accumulates here as scratch and is
/// written to the database only by [`nodes::finalize`].
pub struct WorkflowState {
    pub email: EmailMessage,
    pub attachments: Vec<WorkflowAttachment>,
    pub user: User,
    pub llm_content: Option<String>,
    pub summary_title: Option<String>,
    pub summary_content: Option<String>,
    pub issue_result: Option<IssueResult>,
    pub node_errors: Vec<(String, String)>,
    /// Node-to-node scratch data Finalize merges into `EmailMessage.metadata`
    /// on success (spec SPEC_FULL §D.1) — e.g. which `[IMAGE: ...]`
    /// placeholders `llm_email` actually resolved.
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}

pub struct WorkflowEngine {
    pub(crate) llm: Arc<dyn LlmEngine>,
    pub(crate) ocr: Arc<dyn OcrEngine>,
    pub(crate) issue_tracker_factory: Arc<IssueTrackerFactory>,
}

impl WorkflowEngine {
    pub fn new(llm: Arc<dyn LlmEngine>, ocr: Arc<dyn OcrEngine>) -> Self {
        Self::with_issue_tracker_factory(llm, ocr, Arc::new(default_issue_tracker_factory))
    }

    /// Test/alternate-integration seam: same as [`Self::new`] but with the
    /// Issue node's Jira client swapped for `issue_tracker_factory`.
    pub fn with_issue_tracker_factory(
        llm: Arc<dyn LlmEngine>,
        ocr: Arc<dyn OcrEngine>,
        issue_tracker_factory: Arc<IssueTrackerFactory>,
    ) -> Self {
        Self { llm, ocr, issue_tracker_factory }
    }

    /// Runs the full seven-node pipeline for one email. Never returns an
    /// `Err` for node-level failures — those are recorded into
    /// `state.node_errors` and resolved by Finalize; `Err` here means the
    /// run couldn't even be loaded, or the deadline elapsed.
    pub async fn run(&self, email_id: u64, opts: RunOptions) -> EngineResult<()> {
        let mut state = self.load_state(email_id).await?;

        let deadline = opts.deadline;
        let outcome = tokio::time::timeout(deadline, async {
            nodes::prepare(self, &mut state, &opts).await;
            if state.node_errors.is_empty() {
                nodes::ocr(self, &mut state, &opts).await;
                nodes::llm_attachments(self, &mut state, &opts).await;
                nodes::llm_email(self, &mut state, &opts).await;
                nodes::summary(self, &mut state, &opts).await;
                nodes::issue(self, &mut state, &opts).await;
            }
            nodes::finalize(self, &mut state, &opts).await;
        })
        .await;

        match outcome {
            Ok(()) => Ok(()),
            Err(_) => {
                warn!(email_id, "workflow run exceeded its deadline of {:?}; leaving row for the stuck-task reaper", deadline);
                Err(raise_error!(
                    format!("workflow run for email {} exceeded its deadline", email_id),
                    ErrorCode::TransientIOError
                ))
            }
        }
    }

    async fn load_state(&self, email_id: u64) -> EngineResult<WorkflowState> {
        let email = async_find_impl::<EmailMessage>(DB_MANAGER.meta_db(), email_id)
            .await?
            .ok_or_else(|| raise_error!(format!("no EmailMessage row for id {}", email_id), ErrorCode::ResourceNotFound))?;
        let user = async_find_impl::<User>(DB_MANAGER.meta_db(), email.user_id)
            .await?
            .ok_or_else(|| raise_error!(format!("no User row for id {}", email.user_id), ErrorCode::ResourceNotFound))?;
        let attachments = filter_by_secondary_key_impl::<crate::modules::email::attachment::EmailAttachment>(
            DB_MANAGER.meta_db(),
            EmailAttachmentKey::email_message_id,
            email_id,
        )
        .await?
        .into_iter()
        .map(WorkflowAttachment::new)
        .collect();

        info!(email_id, attachments = attachments.len(), "workflow run loaded");
        Ok(WorkflowState {
            email,
            attachments,
            user,
            llm_content: None,
            summary_title: None,
            summary_content: None,
            issue_result: None,
            node_errors: Vec::new(),
            metadata: std::collections::HashMap::new(),
        })
    }
}
