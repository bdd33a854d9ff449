// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Fixed-output capability stand-ins for the literal scenarios in spec §8,
//! mirroring the teacher's pattern of putting test-only fakes behind the
//! same trait the production adapters implement.

use crate::modules::capability::{LlmEngine, OcrEngine};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineResult;
use crate::raise_error;
use async_trait::async_trait;

/// Echoes `user_content` back unchanged, as spec §8's testable property 6
/// requires ("the system test uses a mock LLM that echoes input").
pub struct EchoLlmEngine;

#[async_trait]
impl LlmEngine for EchoLlmEngine {
    async fn chat(
        &self,
        _system_prompt: &str,
        user_content: &str,
        _language: Option<&str>,
    ) -> EngineResult<String> {
        Ok(user_content.to_string())
    }
}

/// Always returns the same fixed line, used by spec §8's S2 scenario
/// (`mock OCR returns "ERR 500"`).
pub struct FixedOcrEngine {
    pub line: String,
}

impl FixedOcrEngine {
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }
}

#[async_trait]
impl OcrEngine for FixedOcrEngine {
    async fn recognize(&self, _image_path: &str) -> EngineResult<Vec<String>> {
        Ok(vec![self.line.clone()])
    }
}

/// Always fails, for exercising a workflow run that dies partway through
/// (spec §8 S5: force-replay recovery after a partial failure).
pub struct FailingLlmEngine;

#[async_trait]
impl LlmEngine for FailingLlmEngine {
    async fn chat(
        &self,
        _system_prompt: &str,
        _user_content: &str,
        _language: Option<&str>,
    ) -> EngineResult<String> {
        Err(raise_error!(
            "mock LLM engine configured to always fail".to_string(),
            ErrorCode::LlmApiError
        ))
    }
}
