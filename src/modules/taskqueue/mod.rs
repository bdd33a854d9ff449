// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! Generic persisted task queue: background jobs (fetch, workflow, webhook
//! delivery) are stored as [`model::TaskMeta`] rows and driven to completion
//! with retry. This is execution plumbing; domain trace entities such as
//! `email::task_trace::EmailTask` are modeled separately on top of it.

mod cleaner;
pub mod context;
mod flow;
mod handlers;
pub mod model;
pub mod nativedb;
pub mod periodic;
mod processor;
pub mod queue;
mod result;
pub mod retry;
pub mod store;
pub mod task;
#[cfg(test)]
mod tests;
mod updater;
