// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::id;
use crate::modules::database::{insert_impl, manager::DB_MANAGER, update_impl};
use crate::modules::error::EngineResult;
use native_db::*;
use native_model::{native_model, Model};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A user/operator-visible trace record of a batch operation (spec §3).
/// Distinct from [`crate::modules::taskqueue::model::TaskMeta`], which is
/// low-level queue-processor bookkeeping the user never sees directly;
/// `EmailTask` rows are written by the scheduler jobs that use the queue
/// (fetch, stuck-task reaper) for observability, per SPEC_FULL §B.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum EmailTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum EmailTaskType {
    FetchUserEmails,
    StuckReaper,
    CreditRenewal,
    PlanDowngrade,
}

impl std::fmt::Display for EmailTaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EmailTaskType::FetchUserEmails => "fetch_user_emails",
            EmailTaskType::StuckReaper => "stuck_reaper",
            EmailTaskType::CreditRenewal => "credit_renewal",
            EmailTaskType::PlanDowngrade => "plan_downgrade",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[native_model(id = 28, version = 1)]
#[native_db]
pub struct EmailTask {
    #[primary_key]
    pub id: u64,
    /// `None` for system-wide tasks (the reaper, renewal, downgrade sweeps).
    pub user_id: Option<u64>,
    pub task_type: EmailTaskType,
    pub status: EmailTaskStatus,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub emails_processed: u64,
    pub error_message: Option<String>,
    pub details: HashMap<String, serde_json::Value>,
}

impl EmailTask {
    pub fn start(user_id: Option<u64>, task_type: EmailTaskType) -> Self {
        EmailTask {
            id: id!(64),
            user_id,
            task_type,
            status: EmailTaskStatus::Running,
            started_at: crate::utc_now!(),
            completed_at: None,
            emails_processed: 0,
            error_message: None,
            details: HashMap::new(),
        }
    }

    pub fn complete(mut self, emails_processed: u64) -> Self {
        self.status = EmailTaskStatus::Completed;
        self.completed_at = Some(crate::utc_now!());
        self.emails_processed = emails_processed;
        self
    }

    pub fn fail(mut self, error_message: String) -> Self {
        self.status = EmailTaskStatus::Failed;
        self.completed_at = Some(crate::utc_now!());
        self.error_message = Some(error_message);
        self
    }

    /// Persists the `Running` row so operators can see a sweep in flight
    /// (spec §3). Scheduler jobs call this right after [`EmailTask::start`].
    pub async fn persist(self) -> EngineResult<Self> {
        insert_impl(DB_MANAGER.meta_db(), self.clone()).await?;
        Ok(self)
    }

    /// Overwrites the persisted row with its terminal state.
    pub async fn finish(self) -> EngineResult<()> {
        let id = self.id;
        update_impl::<EmailTask>(
            DB_MANAGER.meta_db(),
            move |rw| {
                rw.get().primary(id).map_err(|e| {
                    crate::raise_error!(format!("{:#?}", e), crate::modules::error::code::ErrorCode::InternalError)
                })?.ok_or_else(|| {
                    crate::raise_error!(
                        format!("no EmailTask row for id {}", id),
                        crate::modules::error::code::ErrorCode::ResourceNotFound
                    )
                })
            },
            move |_current: &EmailTask| Ok(self.clone()),
        )
        .await?;
        Ok(())
    }
}
