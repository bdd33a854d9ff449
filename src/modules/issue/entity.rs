// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::id;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The ticket created by Finalize on a successful workflow run (spec §3,
/// §4.4). At most one successful row per `(email_message_id, engine)`;
/// `external_id` is unique within `engine` — both enforced by
/// [`crate::modules::issue::entity::Issue::dedup_key`] as a secondary key,
/// since the engine-scoped external id is the only externally-visible
/// dedup handle (spec §4.5's finalize step explicitly dedupes on it).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[native_model(id = 29, version = 1)]
#[native_db(secondary_key(dedup_key -> String))]
pub struct Issue {
    #[primary_key]
    pub id: u64,
    pub user_id: u64,
    #[secondary_key]
    pub email_message_id: u64,
    pub title: String,
    pub description: String,
    pub priority: String,
    pub engine: String,
    pub external_id: String,
    pub issue_url: String,
    /// Includes engine-specific state and the LLM field-selection cache
    /// (`llm_description_cached`, `llm_project_key_cached`,
    /// `llm_assignee_cached`; SPEC_FULL §D.1) plus `upload_result`.
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: i64,
}

impl Issue {
    fn dedup_key(&self) -> String {
        Self::dedup_key_for(&self.engine, &self.external_id)
    }

    pub fn dedup_key_for(engine: &str, external_id: &str) -> String {
        format!("{}:{}", engine, external_id)
    }

    pub fn new(
        user_id: u64,
        email_message_id: u64,
        title: String,
        description: String,
        priority: String,
        engine: String,
        external_id: String,
        issue_url: String,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Issue {
            id: id!(64),
            user_id,
            email_message_id,
            title,
            description,
            priority,
            engine,
            external_id,
            issue_url,
            metadata,
            created_at: crate::utc_now!(),
        }
    }
}
