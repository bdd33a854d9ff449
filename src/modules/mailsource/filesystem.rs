// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! The filesystem ("Haraka") `MailSource` (spec §4.1/§6): an MTA drops
//! `<uuid>.eml` + `<uuid>.meta` pairs into `<dropbox_dir>/inbox/`; this
//! source matches each pair to a user by scanning the `.meta` envelope
//! recipients against `User.email` and the `EmailAlias` table, then moves
//! the pair to `processed/` or `failed/`. Grounded on the original's
//! `scan_user_emails` sweep (`threadline/tasks/email_fetch.py`), expressed
//! here as a directory walk rather than a cron-scheduled management command.

use crate::modules::database::{list_all_impl, manager::DB_MANAGER, secondary_find_impl};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineResult;
use crate::modules::mailsource::{parse_rfc822, RawEmail};
use crate::modules::user::entity::{EmailAlias, EmailAliasKey, User};
use crate::raise_error;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// The envelope recipients recorded alongside a dropped `.eml` file.
#[derive(Debug, Deserialize)]
struct DropboxMeta {
    recipients: Vec<String>,
}

fn inbox_dir(base: &str) -> PathBuf {
    Path::new(base).join("inbox")
}

fn processed_dir(base: &str) -> PathBuf {
    Path::new(base).join("processed")
}

fn failed_dir(base: &str) -> PathBuf {
    Path::new(base).join("failed")
}

/// One matched drop: the parsed email plus the user it routes to.
pub struct MatchedDrop {
    pub user_id: u64,
    pub email: RawEmail,
}

/// Scans `<base>/inbox/` for `<uuid>.eml`/`<uuid>.meta` pairs, matches each
/// against a user, and moves every pair out of `inbox/` (spec §4.1). A pair
/// that fails to parse or match moves to `failed/`; the rest move to
/// `processed/` only after parsing succeeds.
pub async fn scan(base: &str) -> EngineResult<Vec<MatchedDrop>> {
    let inbox = inbox_dir(base);
    let processed = processed_dir(base);
    let failed = failed_dir(base);
    for dir in [&inbox, &processed, &failed] {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::TransientIOError))?;
    }

    let mut entries = fs::read_dir(&inbox)
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::TransientIOError))?;

    let mut uuids = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::TransientIOError))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("eml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                uuids.push(stem.to_string());
            }
        }
    }

    let users = list_all_impl::<User>(DB_MANAGER.meta_db()).await?;
    let mut matches = Vec::new();

    for uuid in uuids {
        let eml_path = inbox.join(format!("{uuid}.eml"));
        let meta_path = inbox.join(format!("{uuid}.meta"));

        let result = process_one(&eml_path, &meta_path, &users).await;
        match result {
            Ok(Some(matched)) => {
                move_pair(&eml_path, &meta_path, &processed, &uuid).await?;
                matches.push(matched);
            }
            Ok(None) => {
                warn!("dropbox entry '{}' matched no user, moving to failed/", uuid);
                move_pair(&eml_path, &meta_path, &failed, &uuid).await?;
            }
            Err(e) => {
                warn!("dropbox entry '{}' failed: {:#?}", uuid, e);
                move_pair(&eml_path, &meta_path, &failed, &uuid).await?;
            }
        }
    }

    info!("dropbox scan of '{}': {} matched", base, matches.len());
    Ok(matches)
}

async fn process_one(
    eml_path: &Path,
    meta_path: &Path,
    users: &[User],
) -> EngineResult<Option<MatchedDrop>> {
    let raw_bytes = fs::read(eml_path)
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::TransientIOError))?;
    let meta_bytes = fs::read(meta_path)
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::TransientIOError))?;
    let meta: DropboxMeta = serde_json::from_slice(&meta_bytes)
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ConfigError))?;

    let Some(user_id) = match_user(&meta.recipients, users).await? else {
        return Ok(None);
    };

    let email = parse_rfc822(&raw_bytes)?;
    Ok(Some(MatchedDrop { user_id, email }))
}

async fn match_user(recipients: &[String], users: &[User]) -> EngineResult<Option<u64>> {
    for recipient in recipients {
        let normalized = recipient.trim().to_lowercase();
        if let Some(user) = users.iter().find(|u| u.email.to_lowercase() == normalized) {
            return Ok(Some(user.id));
        }
        if let Some(alias) =
            secondary_find_impl::<EmailAlias>(DB_MANAGER.meta_db(), EmailAliasKey::alias_email, normalized)
                .await?
        {
            return Ok(Some(alias.user_id));
        }
    }
    Ok(None)
}

async fn move_pair(eml_path: &Path, meta_path: &Path, dest_dir: &Path, uuid: &str) -> EngineResult<()> {
    let dest_eml = dest_dir.join(format!("{uuid}.eml"));
    let dest_meta = dest_dir.join(format!("{uuid}.meta"));
    fs::rename(eml_path, dest_eml)
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::TransientIOError))?;
    fs::rename(meta_path, dest_meta)
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::TransientIOError))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id;
    use crate::modules::database::insert_impl;
    use tempfile::TempDir;

    const RAW_EML: &[u8] = b"From: Customer <customer@example.com>\r\n\
To: support@example.com\r\n\
Subject: Site is down\r\n\
Date: Tue, 5 Mar 2024 00:00:00 +0000\r\n\
Content-Type: text/plain\r\n\
\r\n\
Our site has been down for an hour.\r\n";

    async fn drop_pair(base: &Path, uuid: &str, recipients: &[&str]) {
        let inbox = inbox_dir(base.to_str().unwrap());
        fs::create_dir_all(&inbox).await.unwrap();
        fs::write(inbox.join(format!("{uuid}.eml")), RAW_EML).await.unwrap();
        let meta = serde_json::json!({ "recipients": recipients });
        fs::write(inbox.join(format!("{uuid}.meta")), meta.to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn scan_matches_a_dropped_pair_against_a_users_primary_address() {
        let dir = TempDir::new().unwrap();
        let user = User::new(format!("owner-{}@example.com", id!(64)));
        insert_impl(DB_MANAGER.meta_db(), user.clone()).await.unwrap();
        drop_pair(dir.path(), "abc-123", &[&user.email]).await;

        let matches = scan(dir.path().to_str().unwrap()).await.unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].user_id, user.id);
        assert_eq!(matches[0].email.subject, "Site is down");
        assert!(processed_dir(dir.path().to_str().unwrap()).join("abc-123.eml").exists());
        assert!(!inbox_dir(dir.path().to_str().unwrap()).join("abc-123.eml").exists());
    }

    #[tokio::test]
    async fn scan_matches_a_dropped_pair_against_an_email_alias() {
        let dir = TempDir::new().unwrap();
        let user = User::new(format!("owner-{}@example.com", id!(64)));
        insert_impl(DB_MANAGER.meta_db(), user.clone()).await.unwrap();
        let alias_email = format!("alias-{}@example.com", id!(64));
        let alias = EmailAlias::new(user.id, alias_email.clone());
        insert_impl(DB_MANAGER.meta_db(), alias).await.unwrap();
        drop_pair(dir.path(), "xyz-789", &[&alias_email]).await;

        let matches = scan(dir.path().to_str().unwrap()).await.unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].user_id, user.id);
    }

    #[tokio::test]
    async fn scan_moves_an_unmatched_pair_to_failed() {
        let dir = TempDir::new().unwrap();
        drop_pair(dir.path(), "no-owner", &["nobody@example.com"]).await;

        let matches = scan(dir.path().to_str().unwrap()).await.unwrap();

        assert!(matches.is_empty());
        assert!(failed_dir(dir.path().to_str().unwrap()).join("no-owner.eml").exists());
    }
}
