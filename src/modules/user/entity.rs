// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::utils::encrypt::{decrypt_string, encrypt_string};
use crate::modules::error::EngineResult;
use crate::id;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A registered user of the ingestion engine. Owns exactly one `email_config`,
/// `issue_config` and `prompt_config`; `webhook_config` lives in its own
/// entity (see [`crate::modules::notify::entity::WebhookConfig`]) since
/// notification delivery is keyed off it independently of the rest of a run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 20, version = 1)]
#[native_db]
pub struct User {
    #[primary_key]
    pub id: u64,
    #[secondary_key(unique)]
    pub email: String,
    pub enabled: bool,
    pub email_config: EmailConfig,
    pub issue_config: IssueConfig,
    pub prompt_config: PromptConfig,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub fn new(email: String) -> Self {
        let now = crate::utc_now!();
        User {
            id: id!(64),
            email,
            enabled: true,
            email_config: EmailConfig::default(),
            issue_config: IssueConfig::default(),
            prompt_config: PromptConfig::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum EmailConfigMode {
    /// The fetch scheduler assigns a shared, operator-managed mailbox.
    #[default]
    AutoAssign,
    /// The user supplies their own IMAP connection parameters.
    CustomImap,
}

/// Per-user mail-fetch configuration, covering spec §4.1's `{host, port,
/// username, password, ssl, folder, filters, since}` plus the cursor the
/// fetch scheduler advances on each successful run.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub mode: EmailConfigMode,
    pub imap: Option<ImapConnectionConfig>,
    pub filters: FetchFilters,
    /// `max(configured_since, now - max_age_days)`, advanced to `max(received_at)`
    /// of the last successfully persisted batch.
    pub cursor: Option<i64>,
    pub max_age_days: Option<u32>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ImapConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Encrypted at rest with `utils::encrypt`; callers should only ever see
    /// plaintext via [`ImapConnectionConfig::password`].
    pub encrypted_password: String,
    pub ssl: bool,
    pub folder: String,
}

impl ImapConnectionConfig {
    pub fn new(
        host: String,
        port: u16,
        username: String,
        plaintext_password: &str,
        ssl: bool,
        folder: String,
    ) -> EngineResult<Self> {
        Ok(ImapConnectionConfig {
            host,
            port,
            username,
            encrypted_password: encrypt_string(plaintext_password)?,
            ssl,
            folder,
        })
    }

    pub fn password(&self) -> EngineResult<String> {
        decrypt_string(&self.encrypted_password)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FetchFilters {
    pub unseen_only: bool,
    pub from: Option<String>,
    pub subject: Option<String>,
}

/// Per-user issue-synthesis configuration (spec §4.4, §6).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct IssueConfig {
    pub enable: bool,
    pub engine: IssueEngineKind,
    pub jira: Option<JiraConfig>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum IssueEngineKind {
    #[default]
    Jira,
    Github,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct JiraConfig {
    pub url: String,
    pub username: String,
    pub encrypted_api_token: String,
    pub project_key: String,
    pub default_issue_type: String,
    pub default_priority: String,
    pub epic_link: Option<String>,
    pub assignee: Option<String>,
    pub allow_project_keys: Vec<String>,
    pub allow_assignees: Vec<String>,
    pub project_prompt: Option<String>,
    pub description_prompt: Option<String>,
    pub assignee_prompt: Option<String>,
    #[serde(default = "default_summary_prefix")]
    pub summary_prefix: String,
    pub summary_timestamp: bool,
}

fn default_summary_prefix() -> String {
    "[AI]".to_string()
}

impl JiraConfig {
    pub fn api_token(&self) -> EngineResult<String> {
        decrypt_string(&self.encrypted_api_token)
    }
}

/// Per-user LLM prompt configuration (spec §6's `prompt_config`).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    pub email_content_prompt: String,
    pub ocr_prompt: String,
    pub summary_prompt: String,
    pub summary_title_prompt: String,
    pub output_language: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Cancelled,
}

/// A billing plan. `workflow_cost_credits` and the renewal window are read
/// by the credits ledger rather than hardcoded (spec §4.3, SPEC_FULL §B).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 21, version = 1)]
#[native_db]
pub struct Plan {
    #[primary_key]
    pub id: u64,
    #[secondary_key(unique)]
    pub name: String,
    pub is_free: bool,
    pub credits_per_period: u64,
    pub period_days: i64,
    pub workflow_cost_credits: u64,
}

/// A user's subscription to a [`Plan`]. The core only reads `status` to
/// decide renewal/downgrade eligibility (spec §4.3); plan changes and
/// payment-provider webhooks are out of scope (spec §1).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 22, version = 1)]
#[native_db]
pub struct Subscription {
    #[primary_key]
    pub id: u64,
    #[secondary_key(unique)]
    pub user_id: u64,
    pub plan_id: u64,
    pub status: SubscriptionStatus,
    /// Set the instant `status` first becomes `PastDue`; cleared on renewal.
    pub past_due_since: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A secondary address routed to a user's mailbox, for the filesystem
/// drop-box source's recipient-to-user matching (spec §4.1: "scanning
/// recipients against (a) `User.email`, (b) an `EmailAlias` table").
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 31, version = 1)]
#[native_db]
pub struct EmailAlias {
    #[primary_key]
    pub id: u64,
    pub user_id: u64,
    #[secondary_key(unique)]
    pub alias_email: String,
    pub created_at: i64,
}

impl EmailAlias {
    pub fn new(user_id: u64, alias_email: String) -> Self {
        EmailAlias {
            id: id!(64),
            user_id,
            alias_email,
            created_at: crate::utc_now!(),
        }
    }
}
