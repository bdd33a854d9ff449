// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

pub mod engine;
pub mod entity;
pub mod jira;
pub mod jira_utils;
