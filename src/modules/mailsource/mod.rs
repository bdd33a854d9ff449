// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! `MailSource` (spec §4.1): two implementations behind one interface,
//! `Fetch(user, cursor) -> (Vec<RawEmail>, new_cursor)`. Both ultimately
//! parse RFC-822 bytes with `mail_parser` the same way the teacher's
//! `envelope::detect` does, then run the placeholder-positioning pass from
//! [`image_positioning`] before handing text content to the workflow.

pub mod filesystem;
pub mod image_positioning;
pub mod imap;

use crate::modules::common::{Addr, AddrVec};
use crate::modules::database::{insert_impl, manager::DB_MANAGER, secondary_find_impl};
use crate::modules::email::attachment::EmailAttachment;
use crate::modules::email::message::{EmailMessage, EmailMessageKey};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineResult;
use crate::modules::mailsource::image_positioning::{embed_images, ImagePlaceholder};
use crate::modules::settings::SETTINGS;
use crate::raise_error;
use mail_parser::{Message, MessageParser, MimeHeaders};
use ring::digest::{digest, SHA256};
use std::path::Path;
use tokio::fs;
use tracing::warn;

/// One MIME part extracted from a raw message, not yet persisted.
pub struct RawAttachment {
    pub content_id: Option<String>,
    pub filename: String,
    pub content_type: String,
    pub is_image: bool,
    pub bytes: Vec<u8>,
}

/// One fetched message, not yet persisted as an [`crate::modules::email::message::EmailMessage`].
pub struct RawEmail {
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub received_at: i64,
    pub raw_content: String,
    pub html_content: Option<String>,
    pub text_content: Option<String>,
    pub attachments: Vec<RawAttachment>,
}

/// `sha256(subject|sender|recipients|received_at)[:16]`, prefixed `email_`
/// (spec §4.1). Deliberately not the RFC `Message-ID` header.
pub fn stable_message_id(subject: &str, sender: &str, recipients: &[String], received_at: i64) -> String {
    let basis = format!("{subject}|{sender}|{}|{received_at}", recipients.join(","));
    let digest = digest(&SHA256, basis.as_bytes());
    let hex = hex::encode(digest.as_ref());
    format!("email_{}", &hex[..16])
}

/// Content-addresses attachment bytes: `sha256(bytes).hex() + ext` (spec §6).
pub fn safe_filename(bytes: &[u8], ext: &str) -> String {
    let digest = digest(&SHA256, bytes);
    let hex = hex::encode(digest.as_ref());
    if ext.is_empty() {
        hex
    } else {
        format!("{hex}.{}", ext.trim_start_matches('.'))
    }
}

fn extension_of(filename: &str, content_type: &str) -> String {
    if let Some((_, ext)) = filename.rsplit_once('.') {
        if !ext.is_empty() && ext.len() <= 8 {
            return ext.to_lowercase();
        }
    }
    content_type
        .rsplit_once('/')
        .map(|(_, sub)| sub.to_lowercase())
        .unwrap_or_default()
}

/// Parses RFC-822 bytes into a [`RawEmail`], grounded on the teacher's
/// `envelope::detect`'s `MessageParser::default().parse()` call. Text and
/// HTML body parts are joined; image `cid:` parts are matched against
/// `<img src="cid:...">` references in the HTML body and positioned inline
/// via [`image_positioning::embed_images`].
pub fn parse_rfc822(raw: &[u8]) -> EngineResult<RawEmail> {
    let message: Message<'_> = MessageParser::default().parse(raw).ok_or_else(|| {
        raise_error!(
            "failed to parse RFC-822 message".to_string(),
            ErrorCode::ConfigError
        )
    })?;

    let subject = message.subject().unwrap_or_default().to_string();
    let sender = message
        .from()
        .and_then(|addr| addr.first())
        .map(Addr::from)
        .map(|a| a.address.unwrap_or_default())
        .unwrap_or_default();
    let recipients: Vec<String> = message
        .to()
        .map(AddrVec::from)
        .map(|v| v.iter().filter_map(|a| a.address.clone()).collect())
        .unwrap_or_default();
    let received_at = message
        .date()
        .map(|d| d.to_timestamp())
        .unwrap_or_else(|| crate::utc_now!() / 1000);

    let html_content = message.body_html(0).map(|s| s.to_string());
    let text_content_raw = message.body_text(0).map(|s| s.to_string());

    let mut attachments = Vec::new();
    for attachment in message.attachments() {
        let content_type = attachment
            .content_type()
            .map(|ct| match ct.subtype() {
                Some(sub) => format!("{}/{}", ct.ctype(), sub),
                None => ct.ctype().to_string(),
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let is_image = content_type.starts_with("image/");
        let filename = attachment
            .attachment_name()
            .unwrap_or("attachment.bin")
            .to_string();
        let content_id = attachment.content_id().map(|s| s.to_string());
        attachments.push(RawAttachment {
            content_id,
            filename,
            content_type,
            is_image,
            bytes: attachment.contents().to_vec(),
        });
    }

    let placeholders: Vec<ImagePlaceholder> = attachments
        .iter()
        .filter(|a| a.is_image)
        .filter_map(|a| {
            a.content_id.as_ref().map(|cid| ImagePlaceholder {
                content_id: cid.trim_matches(|c| c == '<' || c == '>').to_string(),
                safe_filename: safe_filename(&a.bytes, &extension_of(&a.filename, &a.content_type)),
            })
        })
        .collect();

    let text_content = text_content_raw.map(|text| embed_images(&text, html_content.as_deref(), &placeholders));

    let message_id = stable_message_id(&subject, &sender, &recipients, received_at);

    Ok(RawEmail {
        message_id,
        subject,
        sender,
        recipients,
        received_at,
        raw_content: String::from_utf8_lossy(raw).to_string(),
        html_content,
        text_content,
        attachments,
    })
}

/// Persists a [`RawEmail`] as an [`EmailMessage`] plus its [`EmailAttachment`]
/// rows, writing attachment bytes to `<attachment_dir>/<safe_filename>` the
/// first time that hash is seen (spec §6, §8 invariant 5: dedup by hash).
/// Oversized attachments (> `max_attachment_bytes`) are dropped with a
/// warning rather than failing the whole message. Returns `None` if a row
/// for `(user_id, message_id)` already exists (idempotent re-fetch).
pub async fn persist(user_id: u64, email: RawEmail) -> EngineResult<Option<EmailMessage>> {
    let key = EmailMessage::user_message_key(user_id, &email.message_id);
    if secondary_find_impl::<EmailMessage>(DB_MANAGER.meta_db(), EmailMessageKey::user_message_key, key)
        .await?
        .is_some()
    {
        return Ok(None);
    }

    let message = EmailMessage::new(
        user_id,
        email.message_id,
        email.subject,
        email.sender,
        email.recipients,
        email.received_at,
        email.raw_content,
        email.html_content,
        email.text_content,
    );
    insert_impl(DB_MANAGER.meta_db(), message.clone()).await?;

    fs::create_dir_all(&SETTINGS.attachment_dir)
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::TransientIOError))?;

    for attachment in email.attachments {
        if attachment.bytes.len() as u64 > SETTINGS.max_attachment_bytes {
            warn!(
                "dropping oversized attachment '{}' ({} bytes) on message {}",
                attachment.filename,
                attachment.bytes.len(),
                message.id
            );
            continue;
        }
        let ext = extension_of(&attachment.filename, &attachment.content_type);
        let safe_name = safe_filename(&attachment.bytes, &ext);
        let file_path = Path::new(&SETTINGS.attachment_dir).join(&safe_name);
        if !fs::try_exists(&file_path).await.unwrap_or(false) {
            fs::write(&file_path, &attachment.bytes)
                .await
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::TransientIOError))?;
        }

        let mut entity = EmailAttachment::new(
            user_id,
            message.id,
            attachment.filename,
            attachment.content_type,
            attachment.bytes.len() as u64,
            file_path.to_string_lossy().to_string(),
            attachment.is_image,
        );
        entity.safe_filename = safe_name;
        insert_impl(DB_MANAGER.meta_db(), entity).await?;
    }

    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id;
    use crate::modules::database::async_find_impl;
    use crate::modules::database::filter_by_secondary_key_impl;
    use crate::modules::email::attachment::EmailAttachmentKey;
    use crate::modules::email::message::EmailStatus;

    #[test]
    fn stable_message_id_is_deterministic_and_recipient_order_sensitive() {
        let a = stable_message_id("Subject", "a@example.com", &["b@example.com".to_string()], 1_000);
        let b = stable_message_id("Subject", "a@example.com", &["b@example.com".to_string()], 1_000);
        assert_eq!(a, b);
        assert!(a.starts_with("email_"));

        let reordered = stable_message_id(
            "Subject",
            "a@example.com",
            &["b@example.com".to_string(), "c@example.com".to_string()],
            1_000,
        );
        assert_ne!(a, reordered);
    }

    #[test]
    fn safe_filename_is_content_addressed_and_normalizes_the_extension() {
        let name = safe_filename(b"hello world", ".PNG");
        assert!(name.ends_with(".png"));
        assert_eq!(safe_filename(b"hello world", "jpg"), safe_filename(b"hello world", "jpg"));
        assert_ne!(safe_filename(b"hello world", "jpg"), safe_filename(b"goodbye world", "jpg"));
    }

    #[test]
    fn extension_of_prefers_the_filename_suffix_over_the_mime_subtype() {
        assert_eq!(extension_of("screenshot.PNG", "image/png"), "png");
        assert_eq!(extension_of("attachment", "image/jpeg"), "jpeg");
        assert_eq!(extension_of("no_extension_but_a_really_long_one_here", "image/jpeg"), "jpeg");
    }

    #[test]
    fn parse_rfc822_extracts_headers_and_text_body() {
        let raw = b"From: Customer <customer@example.com>\r\n\
To: support@example.com\r\n\
Subject: Printer jam on floor 3\r\n\
Date: Tue, 5 Mar 2024 00:00:00 +0000\r\n\
Content-Type: text/plain\r\n\
\r\n\
The printer on floor 3 keeps jamming.\r\n";

        let parsed = parse_rfc822(raw).unwrap();
        assert_eq!(parsed.subject, "Printer jam on floor 3");
        assert_eq!(parsed.sender, "customer@example.com");
        assert_eq!(parsed.recipients, vec!["support@example.com".to_string()]);
        assert!(parsed.text_content.unwrap().contains("keeps jamming"));
        assert!(parsed.attachments.is_empty());
    }

    #[tokio::test]
    async fn persist_inserts_a_message_and_is_idempotent_on_replay() {
        let user_id = id!(64);
        let raw = RawEmail {
            message_id: format!("email_{}", id!(64)),
            subject: "Subject".to_string(),
            sender: "sender@example.com".to_string(),
            recipients: vec!["support@example.com".to_string()],
            received_at: crate::utc_now!(),
            raw_content: "raw".to_string(),
            html_content: None,
            text_content: Some("body".to_string()),
            attachments: Vec::new(),
        };
        let message_id = raw.message_id.clone();

        let first = persist(user_id, raw).await.unwrap();
        assert!(first.is_some());
        let stored_id = first.unwrap().id;

        let replay = RawEmail {
            message_id,
            subject: "Subject".to_string(),
            sender: "sender@example.com".to_string(),
            recipients: vec!["support@example.com".to_string()],
            received_at: crate::utc_now!(),
            raw_content: "raw".to_string(),
            html_content: None,
            text_content: Some("body".to_string()),
            attachments: Vec::new(),
        };
        let second = persist(user_id, replay).await.unwrap();
        assert!(second.is_none());

        let stored = async_find_impl::<EmailMessage>(DB_MANAGER.meta_db(), stored_id).await.unwrap().unwrap();
        assert_eq!(stored.status, EmailStatus::Fetched);

        let attachments = filter_by_secondary_key_impl::<EmailAttachment>(
            DB_MANAGER.meta_db(),
            EmailAttachmentKey::email_message_id,
            stored_id,
        )
        .await
        .unwrap();
        assert!(attachments.is_empty());
    }
}
