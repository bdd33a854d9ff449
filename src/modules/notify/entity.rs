// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::id;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// A user's webhook subscription (spec §4.7, §6). Kept as its own entity
/// rather than a field on `User` so `NotificationDispatcher` can look one up
/// by `user_id` without loading the rest of the user's configuration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 30, version = 1)]
#[native_db]
pub struct WebhookConfig {
    #[primary_key]
    pub id: u64,
    #[secondary_key(unique)]
    pub user_id: u64,
    pub url: String,
    /// `EmailStatus` values (rendered via `Display`) this webhook fires on.
    pub events: Vec<String>,
    pub provider: String,
    pub language: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub enabled: bool,
}

impl WebhookConfig {
    pub fn new(user_id: u64, url: String) -> Self {
        WebhookConfig {
            id: id!(64),
            user_id,
            url,
            events: vec!["success".to_string(), "failed".to_string()],
            provider: "card".to_string(),
            language: "en".to_string(),
            timeout_secs: 10,
            retries: 3,
            enabled: true,
        }
    }
}
