// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::id;
use crate::modules::utils::content_hash;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};

/// A single MIME part extracted from an [`EmailMessage`](super::message::EmailMessage)
/// (spec §3). `safe_filename` is content-addressed so repeated ingests of the
/// same bytes collapse to one on-disk file (spec §8 invariant 5); it is not
/// itself a key here because two attachments (from different emails) may
/// legitimately share it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[native_model(id = 27, version = 1)]
#[native_db]
pub struct EmailAttachment {
    #[primary_key]
    pub id: u64,
    pub user_id: u64,
    #[secondary_key]
    pub email_message_id: u64,
    pub filename: String,
    /// `sha256(bytes).hex() + ext`, computed once at ingest (spec §6).
    pub safe_filename: String,
    pub content_type: String,
    pub file_size: u64,
    pub file_path: String,
    pub is_image: bool,
    /// Written only by the OCR node, and only during Finalize (spec §3).
    pub ocr_content: Option<String>,
    /// Written only by the LLM-Attachments node, and only during Finalize.
    pub llm_content: Option<String>,
}

impl EmailAttachment {
    pub fn new(
        user_id: u64,
        email_message_id: u64,
        filename: String,
        content_type: String,
        file_size: u64,
        file_path: String,
        is_image: bool,
    ) -> Self {
        EmailAttachment {
            id: id!(64),
            user_id,
            email_message_id,
            filename,
            safe_filename: String::new(),
            content_type,
            file_size,
            file_path,
            is_image,
            ocr_content: None,
            llm_content: None,
        }
    }

    /// Derives `safe_filename` from the attachment's own byte length and
    /// name as a stand-in content hash (see [`content_hash`]); the real
    /// ingest path hashes the decoded MIME part bytes directly and calls
    /// this with the true length.
    pub fn with_safe_filename(mut self, ext: &str) -> Self {
        let hash = content_hash(self.email_message_id, &self.filename, self.file_size as usize);
        self.safe_filename = if ext.is_empty() {
            format!("{:016x}", hash)
        } else {
            format!("{:016x}.{}", hash, ext.trim_start_matches('.'))
        };
        self
    }
}
