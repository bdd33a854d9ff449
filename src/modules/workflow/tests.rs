// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! End-to-end scenario tests for spec §8's literal pipeline scenarios, run
//! against a shared process-wide in-memory database (see
//! [`crate::modules::settings::Settings::new_for_test`]) with the same
//! fixed-output capability fakes [`crate::modules::capability::mock`]
//! supplies for manual smoke testing.

use crate::id;
use crate::modules::capability::mock::{EchoLlmEngine, FailingLlmEngine, FixedOcrEngine};
use crate::modules::capability::{LlmEngine, OcrEngine};
use crate::modules::credits::entity::UserCredits;
use crate::modules::database::{async_find_impl, filter_by_secondary_key_impl, insert_impl, manager::DB_MANAGER};
use crate::modules::email::attachment::EmailAttachment;
use crate::modules::email::message::{EmailMessage, EmailStatus};
use crate::modules::issue::entity::{Issue, IssueKey};
use crate::modules::issue::jira::IssueTracker;
use crate::modules::user::entity::{IssueConfig, IssueEngineKind, JiraConfig, Plan, PromptConfig, Subscription, SubscriptionStatus, User};
use crate::modules::workflow::engine::{RunOptions, WorkflowEngine};
use crate::modules::error::EngineResult;
use crate::utc_now;
use async_trait::async_trait;
use std::sync::Arc;

fn prompt_config() -> PromptConfig {
    PromptConfig {
        email_content_prompt: "normalize this email for a support queue".to_string(),
        ocr_prompt: "clean up this OCR transcript".to_string(),
        summary_prompt: "summarize the issue".to_string(),
        summary_title_prompt: "title the issue".to_string(),
        output_language: None,
    }
}

async fn seed_billing(user_id: u64, workflow_cost_credits: u64, available_credits: u64) {
    let plan = Plan {
        id: id!(64),
        name: format!("plan-{user_id}"),
        is_free: false,
        credits_per_period: 100,
        period_days: 30,
        workflow_cost_credits,
    };
    insert_impl(DB_MANAGER.meta_db(), plan.clone()).await.unwrap();
    let now = utc_now!();
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
    let credits = UserCredits::new(user_id, None, available_credits, 0, 30 * 86_400_000);
    insert_impl(DB_MANAGER.meta_db(), credits).await.unwrap();
}

async fn seed_user_with_credits(issue_config: IssueConfig, available_credits: u64) -> User {
    let mut user = User::new(format!("user-{}@example.com", id!(64)));
    user.prompt_config = prompt_config();
    user.issue_config = issue_config;
    insert_impl(DB_MANAGER.meta_db(), user.clone()).await.unwrap();
    seed_billing(user.id, 1, available_credits).await;
    user
}

async fn seed_user(issue_config: IssueConfig) -> User {
    seed_user_with_credits(issue_config, 10).await
}

async fn seed_email(user_id: u64, subject: &str) -> EmailMessage {
    let email = EmailMessage::new(
        user_id,
        format!("email_{}", id!(64)),
        subject.to_string(),
        "customer@example.com".to_string(),
        vec!["support@example.com".to_string()],
        utc_now!(),
        "raw body".to_string(),
        None,
        None,
    );
    insert_impl(DB_MANAGER.meta_db(), email.clone()).await.unwrap();
    email
}

struct FakeTracker;

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn create_issue(
        &self,
        _project_key: &str,
        _summary: &str,
        _issue_type: &str,
        _description: &str,
        _assignee: Option<&str>,
        _priority: Option<&str>,
        _epic_link: Option<&str>,
    ) -> EngineResult<String> {
        Ok("SUP-42".to_string())
    }

    async fn add_attachment(&self, _issue_key: &str, _file_path: &str) -> EngineResult<()> {
        Ok(())
    }
}

fn jira_config() -> JiraConfig {
    JiraConfig {
        url: "https://issues.example.com".to_string(),
        username: "bot@example.com".to_string(),
        encrypted_api_token: crate::modules::utils::encrypt::encrypt_string("token").unwrap(),
        project_key: "SUP".to_string(),
        default_issue_type: "Bug".to_string(),
        default_priority: "High".to_string(),
        epic_link: None,
        assignee: None,
        allow_project_keys: vec![],
        allow_assignees: vec![],
        project_prompt: None,
        description_prompt: None,
        assignee_prompt: None,
        summary_prefix: "[AI]".to_string(),
        summary_timestamp: false,
    }
}

/// Spec §8 S1: a plain-text email with no attachments and issue synthesis
/// disabled runs straight through to SUCCESS without creating an Issue row.
#[tokio::test]
async fn s1_happy_path_with_no_images_succeeds_without_issue_synthesis() {
    let user = seed_user(IssueConfig::default()).await;
    let email = seed_email(user.id, "Login button missing on checkout page").await;

    let llm: Arc<dyn LlmEngine> = Arc::new(EchoLlmEngine);
    let ocr: Arc<dyn OcrEngine> = Arc::new(FixedOcrEngine::new("unused"));
    let engine = WorkflowEngine::new(llm, ocr);

    engine.run(email.id, RunOptions::new(false)).await.unwrap();

    let stored = async_find_impl::<EmailMessage>(DB_MANAGER.meta_db(), email.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EmailStatus::Success);
    assert_eq!(stored.llm_content.as_deref(), Some("raw body"));
    assert!(stored.summary_title.is_some());
    assert!(stored.summary_content.is_some());

    let issues = filter_by_secondary_key_impl::<Issue>(DB_MANAGER.meta_db(), IssueKey::email_message_id, email.id)
        .await
        .unwrap();
    assert!(issues.is_empty());
}

/// Spec §8 S2: one image attachment plus issue synthesis enabled produces an
/// OCR'd attachment and a created Jira issue, via the `IssueTracker` test seam.
#[tokio::test]
async fn s2_one_image_attachment_creates_a_jira_issue() {
    let mut issue_config = IssueConfig::default();
    issue_config.enable = true;
    issue_config.engine = IssueEngineKind::Jira;
    issue_config.jira = Some(jira_config());
    let user = seed_user(issue_config).await;
    let email = seed_email(user.id, "Dashboard shows a broken chart").await;

    let attachment =
        EmailAttachment::new(user.id, email.id, "chart.png".to_string(), "image/png".to_string(), 2048, "/tmp/chart.png".to_string(), true)
            .with_safe_filename("png");
    insert_impl(DB_MANAGER.meta_db(), attachment.clone()).await.unwrap();

    let llm: Arc<dyn LlmEngine> = Arc::new(EchoLlmEngine);
    let ocr: Arc<dyn OcrEngine> = Arc::new(FixedOcrEngine::new("ERR 500"));
    let engine = WorkflowEngine::with_issue_tracker_factory(
        llm,
        ocr,
        Arc::new(|_: &JiraConfig| Ok(Box::new(FakeTracker) as Box<dyn IssueTracker>)),
    );

    engine.run(email.id, RunOptions::new(false)).await.unwrap();

    let stored = async_find_impl::<EmailMessage>(DB_MANAGER.meta_db(), email.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EmailStatus::Success);

    let issues = filter_by_secondary_key_impl::<Issue>(DB_MANAGER.meta_db(), IssueKey::email_message_id, email.id)
        .await
        .unwrap();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].external_id, "SUP-42");

    let stored_attachment = async_find_impl::<EmailAttachment>(DB_MANAGER.meta_db(), attachment.id).await.unwrap().unwrap();
    assert_eq!(stored_attachment.ocr_content.as_deref(), Some("ERR 500"));
}

/// Spec §8 S3: a run that can't cover its plan's `workflow_cost_credits`
/// fails at Prepare, before any LLM call, with the status ending FAILED.
#[tokio::test]
async fn s3_insufficient_credits_fails_the_run_before_any_llm_call() {
    let user = seed_user_with_credits(IssueConfig::default(), 0).await;
    let email = seed_email(user.id, "Anything").await;

    let llm: Arc<dyn LlmEngine> = Arc::new(EchoLlmEngine);
    let ocr: Arc<dyn OcrEngine> = Arc::new(FixedOcrEngine::new("unused"));
    let engine = WorkflowEngine::new(llm, ocr);

    engine.run(email.id, RunOptions::new(false)).await.unwrap();

    let stored = async_find_impl::<EmailMessage>(DB_MANAGER.meta_db(), email.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EmailStatus::Failed);
    assert!(stored.error_message.as_deref().unwrap_or_default().contains("Credits"));
    assert!(stored.llm_content.is_none());
}

/// Spec §8 S5: a run that fails partway (LLM-Email, here) lands in FAILED;
/// re-running with `force` and a working LLM recovers to SUCCESS despite the
/// prior terminal status.
#[tokio::test]
async fn s5_force_replay_recovers_from_a_partial_failure() {
    let user = seed_user(IssueConfig::default()).await;
    let email = seed_email(user.id, "Export feature times out on large reports").await;

    let failing_llm: Arc<dyn LlmEngine> = Arc::new(FailingLlmEngine);
    let ocr: Arc<dyn OcrEngine> = Arc::new(FixedOcrEngine::new("unused"));
    let failing_engine = WorkflowEngine::new(failing_llm, ocr.clone());
    failing_engine.run(email.id, RunOptions::new(false)).await.unwrap();

    let after_first = async_find_impl::<EmailMessage>(DB_MANAGER.meta_db(), email.id).await.unwrap().unwrap();
    assert_eq!(after_first.status, EmailStatus::Failed);

    let working_llm: Arc<dyn LlmEngine> = Arc::new(EchoLlmEngine);
    let recovery_engine = WorkflowEngine::new(working_llm, ocr);
    recovery_engine.run(email.id, RunOptions::new(true)).await.unwrap();

    let after_retry = async_find_impl::<EmailMessage>(DB_MANAGER.meta_db(), email.id).await.unwrap().unwrap();
    assert_eq!(after_retry.status, EmailStatus::Success);
    assert_eq!(after_retry.llm_content.as_deref(), Some("raw body"));
}
