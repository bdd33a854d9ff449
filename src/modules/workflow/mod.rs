// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! The seven-node workflow graph (spec §4.5, C6): Prepare, OCR,
//! LLM-Attachments, LLM-Email, Summary, Issue, Finalize. Every node shares a
//! mutable [`WorkflowState`] and either advances it or appends to
//! `node_errors`; Finalize is the sole point that persists content, grounded
//! on the teacher's `scheduler::processor`/`scheduler::flow` separation of
//! "drive the state machine" from "run one unit of work".

pub mod engine;
pub mod nodes;
pub mod task;

#[cfg(test)]
mod tests;

pub use engine::{RunOptions, WorkflowEngine, WorkflowState};
