// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Per-user IMAP fetch, queued by [`super::jobs::fetch_tick`] once per
//! `CustomImap` user under that user's single-flight lock (spec §4.1,
//! §4.6.1). `AutoAssign` users have no mailbox of their own to poll and are
//! serviced entirely by the filesystem drop-box sweep in the same tick.

use crate::modules::database::{async_find_impl, manager::DB_MANAGER, update_impl};
use crate::modules::email::task_trace::{EmailTask, EmailTaskType};
use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineResult;
use crate::modules::locks;
use crate::modules::mailsource;
use crate::modules::taskqueue::retry::{RetryPolicy, RetryStrategy};
use crate::modules::taskqueue::task::{Task, TaskFuture};
use crate::modules::user::entity::{EmailConfigMode, User};
use crate::raise_error;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const FETCH_QUEUE: &str = "fetch_user_emails";

pub fn lock_key(user_id: u64) -> String {
    format!("fetch_user_{user_id}")
}

/// One IMAP poll of a single user's mailbox. Holds `lock_key(user_id)` for
/// the run's lifetime so a slow fetch can't overlap a second scheduler tick
/// or a manual re-run against the same mailbox.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchUserEmailsTask {
    pub user_id: u64,
    pub lock_token: String,
}

impl Task for FetchUserEmailsTask {
    const TASK_KEY: &'static str = "fetch_user_emails";
    const TASK_QUEUE: &'static str = FETCH_QUEUE;

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            strategy: RetryStrategy::Linear { interval: 30 },
            max_retries: Some(1),
        }
    }

    fn delay_seconds(&self) -> u32 {
        0
    }

    fn run(self, _task_id: u64) -> TaskFuture {
        Box::pin(async move {
            let outcome = self.fetch_and_persist().await;
            if let Err(e) = locks::release(DB_MANAGER.meta_db(), &lock_key(self.user_id), &self.lock_token).await {
                warn!(user_id = self.user_id, "failed to release fetch lock: {:#?}", e);
            }
            outcome
        })
    }
}

impl FetchUserEmailsTask {
    async fn fetch_and_persist(&self) -> EngineResult<()> {
        let trace = EmailTask::start(Some(self.user_id), EmailTaskType::FetchUserEmails)
            .persist()
            .await?;

        let user = async_find_impl::<User>(DB_MANAGER.meta_db(), self.user_id)
            .await?
            .ok_or_else(|| raise_error!(format!("no User row for id {}", self.user_id), ErrorCode::ResourceNotFound))?;

        if user.email_config.mode != EmailConfigMode::CustomImap {
            trace.complete(0).finish().await?;
            return Ok(());
        }
        let Some(imap) = &user.email_config.imap else {
            trace.complete(0).finish().await?;
            return Ok(());
        };

        let since = user.email_config.cursor.unwrap_or(0);
        let result = mailsource::imap::fetch(imap, &user.email_config.filters, since).await;

        let (emails, new_cursor) = match result {
            Ok(pair) => pair,
            Err(e) => {
                trace.fail(format!("{:#?}", e)).finish().await?;
                return Err(e);
            }
        };

        let mut persisted = 0u64;
        for email in emails {
            if mailsource::persist(self.user_id, email).await?.is_some() {
                persisted += 1;
            }
        }

        if let Some(cursor) = new_cursor {
            update_impl::<User>(
                DB_MANAGER.meta_db(),
                {
                    let user_id = self.user_id;
                    move |rw| {
                        rw.get()
                            .primary(user_id)
                            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?
                            .ok_or_else(|| raise_error!(format!("no User row for id {}", user_id), ErrorCode::ResourceNotFound))
                    }
                },
                move |current: &User| {
                    let mut updated = current.clone();
                    updated.email_config.cursor = Some(cursor);
                    updated.updated_at = crate::utc_now!();
                    Ok(updated)
                },
            )
            .await?;
        }

        trace.complete(persisted).finish().await?;
        Ok(())
    }
}
