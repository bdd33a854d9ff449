// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineResult;
use crate::raise_error;
use crate::modules::settings::SETTINGS;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// `LLM.Chat(system_prompt, user_content, language?) -> string` (spec §6).
/// Implementations must enforce their own timeout; callers additionally
/// wrap every call in the node-level retry budget (spec §4.5's "Retries").
#[async_trait]
pub trait LlmEngine: Send + Sync {
    async fn chat(
        &self,
        system_prompt: &str,
        user_content: &str,
        language: Option<&str>,
    ) -> EngineResult<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    system_prompt: &'a str,
    user_content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

#[derive(Deserialize)]
struct ChatResponse {
    content: String,
}

/// Speaks to an OpenAI-compatible chat-completions-style endpoint that
/// accepts `{system_prompt, user_content, language}` and returns
/// `{content}`. Built the same way `hook::http::HttpClient` is: one
/// `reqwest::Client`, a fixed timeout, no connection pooling beyond
/// `reqwest`'s own.
pub struct HttpLlmEngine {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLlmEngine {
    pub fn new(endpoint: String) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SETTINGS.http_timeout_secs))
            .build()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl LlmEngine for HttpLlmEngine {
    async fn chat(
        &self,
        system_prompt: &str,
        user_content: &str,
        language: Option<&str>,
    ) -> EngineResult<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ChatRequest {
                system_prompt,
                user_content,
                language,
            })
            .send()
            .await
            .map_err(|e| {
                warn!("LLM call to {} failed: {:#?}", self.endpoint, e);
                raise_error!(format!("{:#?}", e), ErrorCode::LlmApiError)
            })?;

        if !response.status().is_success() {
            return Err(raise_error!(
                format!("LLM endpoint returned status {}", response.status()),
                ErrorCode::LlmApiError
            ));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::LlmApiError))?;
        Ok(body.content)
    }
}
