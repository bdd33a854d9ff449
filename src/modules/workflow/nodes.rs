// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! The seven node bodies (spec §4.5). Each takes the shared engine and
//! mutable state and records a `(node, message)` pair into
//! `state.node_errors` on failure rather than short-circuiting the run —
//! Finalize is the only node allowed to decide the run is a failure.

use crate::modules::credits::ledger::CreditsLedger;
use crate::modules::database::manager::DB_MANAGER;
use crate::modules::database::{filter_by_secondary_key_impl, secondary_find_impl, update_impl};
use crate::modules::email::attachment::EmailAttachmentKey;
use crate::modules::email::message::{EmailMessage, EmailStatus};
use crate::modules::issue::engine::IssueEngine;
use crate::modules::issue::entity::{Issue, IssueKey};
use crate::modules::user::entity::IssueEngineKind;
use crate::modules::workflow::engine::{RunOptions, WorkflowEngine, WorkflowState};
use crate::utc_now;
use tracing::warn;

fn record_error(state: &mut WorkflowState, node: &str, message: impl Into<String>) {
    let message = message.into();
    warn!(node, email_id = state.email.id, "{}", message);
    state.node_errors.push((node.to_string(), message));
}

/// Writes `status` to the `EmailMessage` row immediately, unless `force`
/// (spec §4.5 "Force-mode semantics": status transitions are skipped
/// entirely under force). Fine-grained per-node statuses are what let the
/// scheduler's stuck-task reaper (spec §4.6.3) observe a run wedged
/// mid-pipeline and reset it, so these are real DB writes, not just
/// in-memory bookkeeping.
async fn set_status(email_id: u64, status: EmailStatus, opts: &RunOptions) -> crate::modules::error::EngineResult<()> {
    if opts.force {
        return Ok(());
    }
    update_impl::<EmailMessage>(
        DB_MANAGER.meta_db(),
        move |rw| {
            rw.get()
                .primary(email_id)
                .map_err(|e| crate::raise_error!(format!("{:#?}", e), crate::modules::error::code::ErrorCode::InternalError))?
                .ok_or_else(|| {
                    crate::raise_error!(
                        format!("no EmailMessage row for id {}", email_id),
                        crate::modules::error::code::ErrorCode::ResourceNotFound
                    )
                })
        },
        move |current| {
            let mut updated = current.clone();
            updated.status = status;
            updated.updated_at = utc_now!();
            Ok(updated)
        },
    )
    .await?;
    Ok(())
}

/// Node 1. Loads the email/attachments/user, validates the entry status
/// unless `force`, transitions to `PROCESSING`, and reserves credits.
pub async fn prepare(engine: &WorkflowEngine, state: &mut WorkflowState, opts: &RunOptions) {
    if !opts.force && !state.email.status.is_retryable_entry() {
        record_error(
            state,
            "prepare",
            format!(
                "email {} is in status {:?}, not a legal Prepare entry point",
                state.email.id, state.email.status
            ),
        );
        return;
    }

    if let Err(e) = set_status(state.email.id, EmailStatus::Processing, opts).await {
        record_error(state, "prepare", format!("failed to transition to PROCESSING: {e}"));
        return;
    }

    let plan = match load_plan(state.email.user_id).await {
        Ok(plan) => plan,
        Err(e) => {
            record_error(state, "prepare", format!("failed to load billing plan: {e}"));
            return;
        }
    };

    let idempotency_key = format!("email_{}_workflow_execution", state.email.id);
    if let Err(e) = CreditsLedger::consume(
        DB_MANAGER.meta_db(),
        state.email.user_id,
        plan.workflow_cost_credits,
        "workflow_execution",
        &idempotency_key,
        state.email.id,
    )
    .await
    {
        record_error(state, "prepare", format!("credits consume failed: {e}"));
    }

    let _ = engine;
}

async fn load_plan(user_id: u64) -> crate::modules::error::EngineResult<crate::modules::user::entity::Plan> {
    use crate::modules::database::async_find_impl;
    use crate::modules::user::entity::{Plan, Subscription, SubscriptionKey};

    let subscription: Subscription = secondary_find_impl::<Subscription>(DB_MANAGER.meta_db(), SubscriptionKey::user_id, user_id)
        .await?
        .ok_or_else(|| {
            crate::raise_error!(
                format!("no Subscription row for user {}", user_id),
                crate::modules::error::code::ErrorCode::DataIntegrityError
            )
        })?;
    async_find_impl::<Plan>(DB_MANAGER.meta_db(), subscription.plan_id)
        .await?
        .ok_or_else(|| {
            crate::raise_error!(
                format!("no Plan row for id {}", subscription.plan_id),
                crate::modules::error::code::ErrorCode::DataIntegrityError
            )
        })
}

/// Node 2. OCR runs only on image attachments; a per-attachment failure is
/// recorded but never aborts the rest of the batch (spec §4.5 node 2).
pub async fn ocr(engine: &WorkflowEngine, state: &mut WorkflowState, opts: &RunOptions) {
    if let Err(e) = set_status(state.email.id, EmailStatus::OcrProcessing, opts).await {
        record_error(state, "ocr", format!("failed to transition to OCR_PROCESSING: {e}"));
    }

    for attachment in state.attachments.iter_mut() {
        if !attachment.is_image {
            continue;
        }
        if !opts.force && attachment.entity.ocr_content.is_some() {
            continue;
        }
        match engine.ocr.recognize(&attachment.entity.file_path).await {
            Ok(lines) => attachment.ocr_content = Some(lines.join("\n")),
            Err(e) => {
                record_error(
                    state,
                    "ocr",
                    format!("OCR failed for attachment '{}': {e}", attachment.entity.safe_filename),
                );
            }
        }
    }

    let next = if state.node_errors.iter().any(|(n, _)| n == "ocr") {
        EmailStatus::OcrFailed
    } else {
        EmailStatus::OcrSuccess
    };
    let _ = set_status(state.email.id, next, opts).await;
}

/// Node 3. LLM-assisted transcription cleanup, one call per OCR'd image.
pub async fn llm_attachments(engine: &WorkflowEngine, state: &mut WorkflowState, opts: &RunOptions) {
    if let Err(e) = set_status(state.email.id, EmailStatus::LlmOcrProcessing, opts).await {
        record_error(state, "llm_attachments", format!("failed to transition to LLM_OCR_PROCESSING: {e}"));
    }

    let prompt = state.user.prompt_config.ocr_prompt.clone();
    let language = state.user.prompt_config.output_language.clone();

    for attachment in state.attachments.iter_mut() {
        let Some(ocr_content) = attachment.ocr_content.as_ref().filter(|s| !s.is_empty()) else {
            continue;
        };
        match engine.llm.chat(&prompt, ocr_content, language.as_deref()).await {
            Ok(content) => attachment.llm_content = Some(content),
            Err(e) => {
                record_error(
                    state,
                    "llm_attachments",
                    format!("LLM call failed for attachment '{}': {e}", attachment.entity.safe_filename),
                );
            }
        }
    }

    let next = if state.node_errors.iter().any(|(n, _)| n == "llm_attachments") {
        EmailStatus::LlmOcrFailed
    } else {
        EmailStatus::LlmOcrSuccess
    };
    let _ = set_status(state.email.id, next, opts).await;
}

/// Node 4. Resolves working text (`text_content > html_content > raw_content`),
/// inlines per-attachment LLM transcriptions over `[IMAGE: <safe_filename>]`
/// placeholders, and calls the email-content LLM prompt.
pub async fn llm_email(engine: &WorkflowEngine, state: &mut WorkflowState, opts: &RunOptions) {
    if let Err(e) = set_status(state.email.id, EmailStatus::LlmEmailProcessing, opts).await {
        record_error(state, "llm_email", format!("failed to transition to LLM_EMAIL_PROCESSING: {e}"));
    }

    let base_text = state
        .email
        .text_content
        .clone()
        .or_else(|| state.email.html_content.clone())
        .unwrap_or_else(|| state.email.raw_content.clone());

    let mut resolved = base_text;
    let mut inlined_placeholders = Vec::new();
    for attachment in &state.attachments {
        if let Some(content) = attachment.llm_content.as_deref() {
            let placeholder = format!("[IMAGE: {}]", attachment.entity.safe_filename);
            if resolved.contains(&placeholder) {
                resolved = resolved.replace(&placeholder, content);
                inlined_placeholders.push(attachment.entity.safe_filename.clone());
            }
        }
    }
    if !inlined_placeholders.is_empty() {
        state.metadata.insert(
            "inline_attachment_placeholders".to_string(),
            serde_json::json!(inlined_placeholders),
        );
    }

    let prompt = state.user.prompt_config.email_content_prompt.clone();
    let language = state.user.prompt_config.output_language.clone();
    match engine.llm.chat(&prompt, &resolved, language.as_deref()).await {
        Ok(content) => {
            state.llm_content = Some(content);
            let _ = set_status(state.email.id, EmailStatus::LlmEmailSuccess, opts).await;
        }
        Err(e) => {
            record_error(state, "llm_email", format!("LLM call failed: {e}"));
            let _ = set_status(state.email.id, EmailStatus::LlmEmailFailed, opts).await;
        }
    }
}

/// Node 5. Builds the combined basis text and calls the summary/title
/// prompts. Skipped (not an error) if both are already populated and
/// `!force`.
pub async fn summary(engine: &WorkflowEngine, state: &mut WorkflowState, opts: &RunOptions) {
    if !opts.force && state.email.summary_title.is_some() && state.email.summary_content.is_some() {
        return;
    }

    if let Err(e) = set_status(state.email.id, EmailStatus::LlmSummaryProcessing, opts).await {
        record_error(state, "summary", format!("failed to transition to LLM_SUMMARY_PROCESSING: {e}"));
    }

    let mut combined = format!(
        "Subject: {}\nText Content: {}",
        state.email.subject,
        state.llm_content.as_deref().unwrap_or_default()
    );
    for attachment in &state.attachments {
        if let Some(content) = attachment.llm_content.as_deref() {
            combined.push_str(&format!("\nAttachment {}: {}", attachment.entity.safe_filename, content));
        }
    }

    let language = state.user.prompt_config.output_language.clone();
    let content_result = engine
        .llm
        .chat(&state.user.prompt_config.summary_prompt, &combined, language.as_deref())
        .await;
    let title_result = engine
        .llm
        .chat(&state.user.prompt_config.summary_title_prompt, &combined, language.as_deref())
        .await;

    match (content_result, title_result) {
        (Ok(content), Ok(title)) => {
            state.summary_content = Some(content);
            state.summary_title = Some(title);
            let _ = set_status(state.email.id, EmailStatus::LlmSummarySuccess, opts).await;
        }
        (content_result, title_result) => {
            if let Err(e) = content_result {
                record_error(state, "summary", format!("summary content LLM call failed: {e}"));
            }
            if let Err(e) = title_result {
                record_error(state, "summary", format!("summary title LLM call failed: {e}"));
            }
            let _ = set_status(state.email.id, EmailStatus::LlmSummaryFailed, opts).await;
        }
    }
}

/// Node 6. A no-op if the user has issue synthesis disabled. Otherwise
/// assembles and creates the external issue via [`IssueEngine`] (spec §4.4).
pub async fn issue(engine: &WorkflowEngine, state: &mut WorkflowState, opts: &RunOptions) {
    if !state.user.issue_config.enable {
        return;
    }

    if let Err(e) = set_status(state.email.id, EmailStatus::IssueProcessing, opts).await {
        record_error(state, "issue", format!("failed to transition to ISSUE_PROCESSING: {e}"));
    }

    let Some(jira_config) = state.user.issue_config.jira.clone() else {
        record_error(state, "issue", "issue synthesis enabled but no Jira configuration present".to_string());
        let _ = set_status(state.email.id, EmailStatus::IssueFailed, opts).await;
        return;
    };
    if !matches!(state.user.issue_config.engine, IssueEngineKind::Jira) {
        record_error(state, "issue", "only the Jira issue engine is implemented".to_string());
        let _ = set_status(state.email.id, EmailStatus::IssueFailed, opts).await;
        return;
    }

    let tracker = match (engine.issue_tracker_factory)(&jira_config) {
        Ok(tracker) => tracker,
        Err(e) => {
            record_error(state, "issue", format!("failed to build issue tracker: {e}"));
            let _ = set_status(state.email.id, EmailStatus::IssueFailed, opts).await;
            return;
        }
    };

    let email_for_issue = merged_email(state);
    let attachments_for_issue: Vec<_> = state.attachments.iter().map(WorkflowAttachment::merged).collect();

    let cached = if opts.force {
        None
    } else {
        existing_issue_metadata(state.email.id).await
    };

    let issue_engine = IssueEngine::from_boxed(tracker, engine_llm(engine));
    match issue_engine
        .build_and_create(&jira_config, &email_for_issue, &attachments_for_issue, cached.as_ref(), opts.force)
        .await
    {
        Ok(result) => {
            state.issue_result = Some(result);
            let _ = set_status(state.email.id, EmailStatus::IssueSuccess, opts).await;
        }
        Err(e) => {
            record_error(state, "issue", format!("issue creation failed: {e}"));
            let _ = set_status(state.email.id, EmailStatus::IssueFailed, opts).await;
        }
    }
}

fn engine_llm(engine: &WorkflowEngine) -> &dyn crate::modules::capability::LlmEngine {
    engine.llm.as_ref()
}

fn merged_email(state: &WorkflowState) -> EmailMessage {
    let mut email = state.email.clone();
    if let Some(content) = &state.llm_content {
        email.llm_content = Some(content.clone());
    }
    if let Some(title) = &state.summary_title {
        email.summary_title = Some(title.clone());
    }
    if let Some(content) = &state.summary_content {
        email.summary_content = Some(content.clone());
    }
    email
}

async fn existing_issue_metadata(email_message_id: u64) -> Option<std::collections::HashMap<String, serde_json::Value>> {
    filter_by_secondary_key_impl::<Issue>(DB_MANAGER.meta_db(), IssueKey::email_message_id, email_message_id)
        .await
        .ok()
        .and_then(|mut rows| rows.pop())
        .map(|issue| issue.metadata)
}

/// One attachment plus the OCR/LLM scratch content the earlier nodes have
/// derived for it in memory, not yet written to the database (Finalize does
/// that in one pass).
pub struct WorkflowAttachment {
    pub entity: crate::modules::email::attachment::EmailAttachment,
    pub ocr_content: Option<String>,
    pub llm_content: Option<String>,
}

impl WorkflowAttachment {
    pub fn new(entity: crate::modules::email::attachment::EmailAttachment) -> Self {
        let ocr_content = entity.ocr_content.clone();
        let llm_content = entity.llm_content.clone();
        Self { entity, ocr_content, llm_content }
    }

    fn merged(&self) -> crate::modules::email::attachment::EmailAttachment {
        let mut entity = self.entity.clone();
        entity.ocr_content = self.ocr_content.clone();
        entity.llm_content = self.llm_content.clone();
        entity
    }
}

/// Node 7. The sole point that persists node output. On any node error,
/// nothing is written except the terminal `FAILED` status (spec §4.5 node 7).
pub async fn finalize(_engine: &WorkflowEngine, state: &mut WorkflowState, _opts: &RunOptions) {
    let old_status = state.email.status;

    if !state.node_errors.is_empty() {
        if let Some(result) = &state.issue_result {
            warn!(
                email_id = state.email.id,
                external_id = %result.external_id,
                "workflow failed after external issue creation; re-run with force to retry (may duplicate) or link manually"
            );
        }
        let summary = state
            .node_errors
            .iter()
            .map(|(node, msg)| format!("{node}: {msg}"))
            .collect::<Vec<_>>()
            .join("; ");
        let _ = finalize_status(state.email.id, EmailStatus::Failed, Some(summary)).await;
        dispatch(state, old_status, EmailStatus::Failed).await;
        return;
    }

    let llm_content = state.llm_content.clone();
    let summary_title = state.summary_title.clone();
    let summary_content = state.summary_content.clone();
    let scratch_metadata = state.metadata.clone();

    let write_result = update_impl::<EmailMessage>(
        DB_MANAGER.meta_db(),
        {
            let email_id = state.email.id;
            move |rw| {
                rw.get()
                    .primary(email_id)
                    .map_err(|e| crate::raise_error!(format!("{:#?}", e), crate::modules::error::code::ErrorCode::InternalError))?
                    .ok_or_else(|| {
                        crate::raise_error!(
                            format!("no EmailMessage row for id {}", email_id),
                            crate::modules::error::code::ErrorCode::ResourceNotFound
                        )
                    })
            }
        },
        move |current| {
            let mut updated = current.clone();
            if let Some(content) = &llm_content {
                if !content.is_empty() {
                    updated.llm_content = Some(content.clone());
                }
            }
            if let Some(title) = &summary_title {
                if !title.is_empty() {
                    updated.summary_title = Some(title.clone());
                }
            }
            if let Some(content) = &summary_content {
                if !content.is_empty() {
                    updated.summary_content = Some(content.clone());
                }
            }
            for (key, value) in &scratch_metadata {
                if !value.is_null() {
                    updated.metadata.insert(key.clone(), value.clone());
                }
            }
            updated.status = EmailStatus::Success;
            updated.error_message = None;
            updated.updated_at = utc_now!();
            Ok(updated)
        },
    )
    .await;

    if let Err(e) = write_result {
        warn!(email_id = state.email.id, "finalize failed to write EmailMessage: {:#?}", e);
        return;
    }

    if let Err(e) = finalize_attachments(state).await {
        warn!(email_id = state.email.id, "finalize failed to bulk-update attachments: {:#?}", e);
    }

    if let Some(result) = state.issue_result.take() {
        if let Err(e) = persist_issue(state.email.user_id, state.email.id, result).await {
            warn!(email_id = state.email.id, "finalize failed to persist Issue row: {:#?}", e);
        }
    }

    dispatch(state, old_status, EmailStatus::Success).await;
}

async fn finalize_status(
    email_id: u64,
    status: EmailStatus,
    error_message: Option<String>,
) -> crate::modules::error::EngineResult<()> {
    update_impl::<EmailMessage>(
        DB_MANAGER.meta_db(),
        move |rw| {
            rw.get()
                .primary(email_id)
                .map_err(|e| crate::raise_error!(format!("{:#?}", e), crate::modules::error::code::ErrorCode::InternalError))?
                .ok_or_else(|| {
                    crate::raise_error!(
                        format!("no EmailMessage row for id {}", email_id),
                        crate::modules::error::code::ErrorCode::ResourceNotFound
                    )
                })
        },
        move |current| {
            let mut updated = current.clone();
            updated.status = status;
            updated.error_message = error_message.clone();
            updated.updated_at = utc_now!();
            Ok(updated)
        },
    )
    .await?;
    Ok(())
}

async fn finalize_attachments(state: &WorkflowState) -> crate::modules::error::EngineResult<()> {
    use crate::modules::database::batch_update_impl;
    use crate::modules::email::attachment::EmailAttachment;

    let by_id: std::collections::HashMap<u64, (Option<String>, Option<String>)> = state
        .attachments
        .iter()
        .map(|a| (a.entity.id, (a.ocr_content.clone(), a.llm_content.clone())))
        .collect();
    let email_id = state.email.id;

    batch_update_impl::<EmailAttachment>(
        DB_MANAGER.meta_db(),
        move |rw| {
            rw.scan()
                .secondary(EmailAttachmentKey::email_message_id)
                .map_err(|e| crate::raise_error!(format!("{:#?}", e), crate::modules::error::code::ErrorCode::InternalError))?
                .start_with(email_id)
                .map_err(|e| crate::raise_error!(format!("{:#?}", e), crate::modules::error::code::ErrorCode::InternalError))?
                .try_collect()
                .map_err(|e| crate::raise_error!(format!("{:#?}", e), crate::modules::error::code::ErrorCode::InternalError))
        },
        move |targets| {
            Ok(targets
                .iter()
                .map(|current| {
                    let mut updated = current.clone();
                    if let Some((ocr, llm)) = by_id.get(&current.id) {
                        updated.ocr_content = ocr.clone();
                        updated.llm_content = llm.clone();
                    }
                    (current.clone(), updated)
                })
                .collect())
        },
    )
    .await?;
    Ok(())
}

async fn persist_issue(
    user_id: u64,
    email_message_id: u64,
    result: crate::modules::issue::engine::IssueResult,
) -> crate::modules::error::EngineResult<()> {
    use crate::modules::database::insert_impl;

    let dedup_key = Issue::dedup_key_for(&result.engine, &result.external_id);
    if secondary_find_impl::<Issue>(DB_MANAGER.meta_db(), IssueKey::dedup_key, dedup_key)
        .await?
        .is_some()
    {
        return Ok(());
    }

    let issue = Issue::new(
        user_id,
        email_message_id,
        result.title,
        result.description,
        result.priority,
        result.engine,
        result.external_id,
        result.issue_url,
        result.metadata,
    );
    insert_impl(DB_MANAGER.meta_db(), issue).await
}

async fn dispatch(state: &WorkflowState, old_status: EmailStatus, new_status: EmailStatus) {
    use crate::modules::notify::dispatcher::NotificationDispatcher;
    if let Err(e) = NotificationDispatcher::dispatch(state.email.user_id, state.email.id, &state.email.subject, old_status, new_status).await
    {
        warn!(email_id = state.email.id, "notification dispatch failed: {:#?}", e);
    }
}
