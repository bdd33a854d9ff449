// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineResult;
use crate::modules::settings::SETTINGS;
use crate::raise_error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// `OCR.Recognize(image_path) -> []str` (spec §6). Must tolerate an invalid
/// image by returning an empty vec rather than erroring — callers (the OCR
/// node) treat a recognition failure for one attachment as non-fatal to the
/// run.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image_path: &str) -> EngineResult<Vec<String>>;
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    image_path: &'a str,
}

#[derive(Deserialize)]
struct RecognizeResponse {
    lines: Vec<String>,
}

pub struct HttpOcrEngine {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpOcrEngine {
    pub fn new(endpoint: String) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SETTINGS.http_timeout_secs))
            .build()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl OcrEngine for HttpOcrEngine {
    async fn recognize(&self, image_path: &str) -> EngineResult<Vec<String>> {
        let response = match self
            .client
            .post(&self.endpoint)
            .json(&RecognizeRequest { image_path })
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("OCR call for '{}' failed: {:#?}", image_path, e);
                return Ok(Vec::new());
            }
        };

        if !response.status().is_success() {
            warn!(
                "OCR endpoint returned status {} for '{}'",
                response.status(),
                image_path
            );
            return Ok(Vec::new());
        }

        match response.json::<RecognizeResponse>().await {
            Ok(body) => Ok(body.lines),
            Err(e) => {
                warn!("OCR response for '{}' was not valid JSON: {:#?}", image_path, e);
                Ok(Vec::new())
            }
        }
    }
}
