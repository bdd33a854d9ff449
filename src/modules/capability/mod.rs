// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! The two external capabilities the workflow engine depends on (spec §6):
//! `LLM.Chat` and `OCR.Recognize`. Both are opaque HTTP-backed services;
//! the concrete provider wire formats are not specified, so the adapters
//! here speak a generic JSON request/response shape and are swapped for
//! mocks in tests, exactly as the teacher's `HttpClient` (`hook::http`) is
//! a thin, provider-agnostic wrapper around `reqwest`.

pub mod llm;
pub mod mock;
pub mod ocr;

pub use llm::LlmEngine;
pub use ocr::OcrEngine;
