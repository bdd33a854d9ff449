// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

pub mod capability;
pub mod common;
pub mod context;
pub mod credits;
pub mod database;
pub mod email;
pub mod error;
pub mod issue;
pub mod locks;
pub mod logger;
pub mod mailsource;
pub mod notify;
pub mod scheduler;
pub mod settings;
pub mod taskqueue;
pub mod user;
pub mod utils;
pub mod workflow;
