// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::EngineResult;

/// Implemented by every process-wide singleton that needs async setup work
/// (opening a database, loading a snapshot, starting background syncers)
/// before the rest of the system can depend on it. `main.rs` drives these
/// in a fixed order at startup.
pub trait Initialize {
    async fn initialize() -> EngineResult<()>;
}

/// Implemented by long-running background subsystems spawned once at
/// startup and left to run for the lifetime of the process.
pub trait EngineTask {
    fn start();
}
