// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Single-flight distributed lock backed by a TTL row in the metadata database.
//! Guards against two fetch cycles (or a fetch cycle and a manual re-run) racing
//! on the same user's mailbox. There is no equivalent in the teacher codebase —
//! its accounts are never concurrently polled by more than one executor, so this
//! is authored fresh for the ingestion pipeline's "one fetch in flight per user"
//! invariant.

use crate::modules::database::delete_impl;
use crate::modules::error::{code::ErrorCode, EngineResult};
use crate::{raise_error, utc_now};
use native_db::*;
use native_model::{native_model, Model};
use native_db::Database;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[native_model(id = 12, version = 1)]
#[native_db]
pub struct SingleFlightLock {
    #[primary_key]
    pub key: String,
    pub holder_token: String,
    pub acquired_at: i64,
    pub expires_at: i64,
}

/// Attempts to acquire `key` for `ttl_secs` seconds. Returns the token the
/// caller must present to [`release`]. Fails with `StateMachineViolation` if
/// an unexpired lock is already held.
pub async fn acquire(
    database: &Arc<Database<'static>>,
    key: &str,
    ttl_secs: i64,
    holder_token: &str,
) -> EngineResult<()> {
    let db = database.clone();
    let key_owned = key.to_owned();
    let holder_token = holder_token.to_owned();
    let now = utc_now!();
    tokio::task::spawn_blocking(move || {
        let rw = db
            .rw_transaction()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        let existing: Option<SingleFlightLock> = rw
            .get()
            .primary(key_owned.clone())
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;

        if let Some(existing) = &existing {
            if existing.expires_at > now {
                return Err(raise_error!(
                    format!("lock '{}' is already held", key_owned),
                    ErrorCode::StateMachineViolation
                ));
            }
        }

        let lock = SingleFlightLock {
            key: key_owned,
            holder_token,
            acquired_at: now,
            expires_at: now + ttl_secs * 1000,
        };
        if let Some(existing) = existing {
            rw.upsert(lock).map_err(|e| {
                raise_error!(format!("{:#?}", e), ErrorCode::InternalError)
            })?;
            let _ = existing;
        } else {
            rw.insert(lock)
                .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        }
        rw.commit()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(())
    })
    .await
    .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
}

/// Releases `key`, a no-op if it is already absent or held by another token.
pub async fn release(
    database: &Arc<Database<'static>>,
    key: &str,
    holder_token: &str,
) -> EngineResult<()> {
    let db = database.clone();
    let key_owned = key.to_owned();
    let holder_token = holder_token.to_owned();
    delete_impl::<SingleFlightLock>(&db, move |rw| {
        let existing: Option<SingleFlightLock> = rw
            .get()
            .primary(key_owned.clone())
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        match existing {
            Some(lock) if lock.holder_token == holder_token => Ok(lock),
            Some(_) => Err(raise_error!(
                format!("lock '{}' is held by a different owner", key_owned),
                ErrorCode::StateMachineViolation
            )),
            None => Err(raise_error!(
                format!("lock '{}' is not held", key_owned),
                ErrorCode::ResourceNotFound
            )),
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::database::META_MODELS;
    use native_db::Builder;

    #[tokio::test]
    async fn acquire_blocks_second_caller_until_released() {
        let db = Arc::new(Builder::new().create_in_memory(&META_MODELS).unwrap());
        acquire(&db, "user-1-fetch", 60, "token-a").await.unwrap();
        let blocked = acquire(&db, "user-1-fetch", 60, "token-b").await;
        assert!(blocked.is_err());
        release(&db, "user-1-fetch", "token-a").await.unwrap();
        acquire(&db, "user-1-fetch", 60, "token-b").await.unwrap();
    }
}
