// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! The five background sweeps behind spec §4.6: fetch, processing dispatch,
//! stuck-task reaper, credit renewal, plan downgrade. Grounded on the
//! teacher's `overview::clean::MetricsCleanTask` / `cache::imap::task`
//! shape — an [`crate::modules::context::EngineTask`] that fires a handful
//! of [`crate::modules::taskqueue::periodic::PeriodicTask`]s at startup and
//! never stops them, since every sweep here is meant to run for the life of
//! the process.

pub mod jobs;
pub mod task;

use crate::modules::context::EngineTask;
use crate::modules::settings::SETTINGS;
use crate::modules::taskqueue::periodic::PeriodicTask;
use std::time::Duration;

pub struct Scheduler;

impl EngineTask for Scheduler {
    fn start() {
        PeriodicTask::new("fetch-scheduler").start(
            |ctx| Box::pin(jobs::fetch_tick(ctx)),
            None,
            Duration::from_secs(SETTINGS.fetch_interval_secs),
            false,
            true,
        );

        PeriodicTask::new("processing-dispatch").start(
            |ctx| Box::pin(jobs::dispatch_tick(ctx)),
            None,
            Duration::from_secs(SETTINGS.dispatch_interval_secs),
            false,
            true,
        );

        PeriodicTask::new("stuck-task-reaper").start(
            |ctx| Box::pin(jobs::reaper_tick(ctx)),
            None,
            Duration::from_secs(SETTINGS.reaper_interval_secs),
            false,
            false,
        );

        PeriodicTask::new("credit-renewal").start(
            |ctx| Box::pin(jobs::renewal_tick(ctx)),
            None,
            Duration::from_secs(SETTINGS.renewal_interval_secs),
            false,
            false,
        );

        PeriodicTask::new("plan-downgrade").start(
            |ctx| Box::pin(jobs::downgrade_tick(ctx)),
            None,
            Duration::from_secs(SETTINGS.downgrade_interval_secs),
            false,
            false,
        );
    }
}
