// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::id;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The pipeline's state machine (spec §4.5). Transitions are
/// `FETCHED | <stage>_FAILED -> <stage>_PROCESSING -> <stage>_SUCCESS | <stage>_FAILED`,
/// terminating `ISSUE_SUCCESS -> SUCCESS` at finalize. Force-mode runs skip
/// every transition below, per spec §4.5's "Force-mode semantics".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum EmailStatus {
    Fetched,
    Processing,
    OcrProcessing,
    OcrSuccess,
    OcrFailed,
    LlmOcrProcessing,
    LlmOcrSuccess,
    LlmOcrFailed,
    LlmEmailProcessing,
    LlmEmailSuccess,
    LlmEmailFailed,
    LlmSummaryProcessing,
    LlmSummarySuccess,
    LlmSummaryFailed,
    IssueProcessing,
    IssueSuccess,
    IssueFailed,
    Success,
    Failed,
}

impl EmailStatus {
    /// The reaper's "pipeline head" target for any stuck `*_PROCESSING` row
    /// (spec §4.6.3, SPEC_FULL §B: the original resets to the head rather
    /// than the specific stuck stage).
    pub fn is_processing(&self) -> bool {
        matches!(
            self,
            EmailStatus::Processing
                | EmailStatus::OcrProcessing
                | EmailStatus::LlmOcrProcessing
                | EmailStatus::LlmEmailProcessing
                | EmailStatus::LlmSummaryProcessing
                | EmailStatus::IssueProcessing
        )
    }

    /// `true` for any state from which Prepare may legally (re)enter
    /// `PROCESSING`: the pipeline head, or any terminal failure.
    pub fn is_retryable_entry(&self) -> bool {
        matches!(self, EmailStatus::Fetched)
            || self.to_string().ends_with("_failed")
            || matches!(self, EmailStatus::Failed)
    }
}

impl EmailStatus {
    pub fn code(&self) -> u32 {
        *self as u32
    }
}

impl std::fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EmailStatus::Fetched => "fetched",
            EmailStatus::Processing => "processing",
            EmailStatus::OcrProcessing => "ocr_processing",
            EmailStatus::OcrSuccess => "ocr_success",
            EmailStatus::OcrFailed => "ocr_failed",
            EmailStatus::LlmOcrProcessing => "llm_ocr_processing",
            EmailStatus::LlmOcrSuccess => "llm_ocr_success",
            EmailStatus::LlmOcrFailed => "llm_ocr_failed",
            EmailStatus::LlmEmailProcessing => "llm_email_processing",
            EmailStatus::LlmEmailSuccess => "llm_email_success",
            EmailStatus::LlmEmailFailed => "llm_email_failed",
            EmailStatus::LlmSummaryProcessing => "llm_summary_processing",
            EmailStatus::LlmSummarySuccess => "llm_summary_success",
            EmailStatus::LlmSummaryFailed => "llm_summary_failed",
            EmailStatus::IssueProcessing => "issue_processing",
            EmailStatus::IssueSuccess => "issue_success",
            EmailStatus::IssueFailed => "issue_failed",
            EmailStatus::Success => "success",
            EmailStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One ingested email and everything the workflow has derived from it so
/// far (spec §3). `user_message_key` enforces the `(user_id, message_id)`
/// uniqueness invariant as a `native_db` secondary key, since composite keys
/// are modeled here as a single derived field rather than a tuple key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[native_model(id = 26, version = 1)]
#[native_db(secondary_key(status_code -> u32))]
pub struct EmailMessage {
    #[primary_key]
    pub id: u64,
    pub user_id: u64,
    /// The `TaskMeta` id of the `EmailWorkflowTask` currently (or most
    /// recently) driving this row, if any.
    pub task_id: Option<String>,
    /// `sha256(subject|sender|recipients|received_at)[:16]`, prefixed
    /// `email_`; stable across re-fetches (spec §4.1). Deliberately not the
    /// RFC `Message-ID` header, which is frequently malformed.
    pub message_id: String,
    #[secondary_key(unique)]
    pub user_message_key: String,
    pub subject: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub received_at: i64,
    pub raw_content: String,
    pub html_content: Option<String>,
    pub text_content: Option<String>,
    pub llm_content: Option<String>,
    pub summary_title: Option<String>,
    pub summary_content: Option<String>,
    pub status: EmailStatus,
    pub error_message: Option<String>,
    /// Free-form node-to-node scratch data merged in by Finalize on success;
    /// NOT the LLM field-selection cache, which lives on `Issue.metadata`
    /// (SPEC_FULL §D.1).
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl EmailMessage {
    fn status_code(&self) -> u32 {
        self.status.code()
    }

    pub fn user_message_key(user_id: u64, message_id: &str) -> String {
        format!("{}:{}", user_id, message_id)
    }

    pub fn new(
        user_id: u64,
        message_id: String,
        subject: String,
        sender: String,
        recipients: Vec<String>,
        received_at: i64,
        raw_content: String,
        html_content: Option<String>,
        text_content: Option<String>,
    ) -> Self {
        let now = crate::utc_now!();
        EmailMessage {
            id: id!(64),
            user_id,
            task_id: None,
            user_message_key: Self::user_message_key(user_id, &message_id),
            message_id,
            subject,
            sender,
            recipients,
            received_at,
            raw_content,
            html_content,
            text_content,
            llm_content: None,
            summary_title: None,
            summary_content: None,
            status: EmailStatus::Fetched,
            error_message: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
