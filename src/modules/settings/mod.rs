// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use clap::Parser;
use std::sync::LazyLock;

pub mod dir;

#[cfg(not(test))]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::parse);

#[cfg(test)]
pub static SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::new_for_test);

/// Process-wide configuration, parsed from CLI flags with environment-variable overrides.
#[derive(Debug, Parser)]
#[clap(
    name = "issueforge",
    about = "Turns inbound support email into triaged, deduplicated Jira issues.",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Settings {
    /// Log level (default: "info")
    #[clap(long, default_value = "info", env, help = "Set the log level")]
    pub log_level: String,

    /// Enable ANSI formatted logs
    #[clap(long, default_value = "true", env)]
    pub ansi_logs: bool,

    /// Write logs to a rolling file under root_dir/logs instead of stdout
    #[clap(long, default_value = "false", env)]
    pub log_to_file: bool,

    /// Emit logs as JSON
    #[clap(long, default_value = "false", env)]
    pub json_logs: bool,

    /// Root directory for persisted databases, attachment blobs, and logs
    #[clap(long, default_value = "./data", env)]
    pub root_dir: String,

    /// Run the metadata/task-queue databases fully in memory (used by tests)
    #[clap(long, default_value = "false", env)]
    pub memory_mode_enabled: bool,

    /// Cache size in bytes for the metadata database (default 128MB)
    #[clap(long, env)]
    pub metadata_cache_size: Option<usize>,

    /// Cache size in bytes for the task-queue database (default 128MB)
    #[clap(long, env)]
    pub task_queue_cache_size: Option<usize>,

    /// Key used to derive the AES-256-GCM key that encrypts stored secrets
    /// (IMAP passwords, Jira API tokens) at rest.
    #[clap(long, env, default_value = "change-me-in-production")]
    pub encrypt_password: String,

    /// Root directory the Haraka-style filesystem drop-box mail source watches
    #[clap(long, default_value = "./data/dropbox", env)]
    pub dropbox_dir: String,

    /// Root directory attachment blobs are content-addressed into
    #[clap(long, default_value = "./data/attachments", env)]
    pub attachment_dir: String,

    /// Maximum attachment size accepted from a mail source, in bytes (default 25MB)
    #[clap(long, default_value = "26214400", env)]
    pub max_attachment_bytes: u64,

    /// Fetch-scheduler sweep cadence (spec §4.6.1, default hourly), in seconds
    #[clap(long, default_value = "3600", env)]
    pub fetch_interval_secs: u64,

    /// How long a workflow task may sit in a non-terminal state before the
    /// stuck-task reaper resets it back to the pipeline head, in seconds
    #[clap(long, default_value = "1800", env)]
    pub stuck_task_timeout_secs: u64,

    /// Stuck-task reaper sweep cadence, in seconds
    #[clap(long, default_value = "300", env)]
    pub reaper_interval_secs: u64,

    /// How often the scheduler dispatches `Fetched` emails onto the workflow
    /// queue, in seconds (spec §4.6.2)
    #[clap(long, default_value = "60", env)]
    pub dispatch_interval_secs: u64,

    /// Credits-renewal sweep cadence, in seconds
    #[clap(long, default_value = "3600", env)]
    pub renewal_interval_secs: u64,

    /// Plan-downgrade sweep cadence, in seconds
    #[clap(long, default_value = "3600", env)]
    pub downgrade_interval_secs: u64,

    /// Days a paid subscription may sit `PastDue` before the downgrade job
    /// cancels it and creates a free one (spec §4.3)
    #[clap(long, default_value = "7", env)]
    pub downgrade_grace_days: i64,

    /// Bounded concurrency for the background task processor
    #[clap(long, default_value = "16", env)]
    pub task_worker_concurrency: usize,

    /// Connect/request timeout applied to all outbound HTTP calls (LLM, OCR, Jira, webhooks)
    #[clap(long, default_value = "30", env)]
    pub http_timeout_secs: u64,

    /// `LLM.Chat` endpoint the workflow engine's LLM-Attachments/LLM-Email/
    /// Summary nodes call (spec §6)
    #[clap(long, default_value = "http://localhost:9000/v1/chat", env)]
    pub llm_endpoint: String,

    /// `OCR.Recognize` endpoint the workflow engine's OCR node calls (spec §6)
    #[clap(long, default_value = "http://localhost:9001/v1/recognize", env)]
    pub ocr_endpoint: String,

    /// How long a terminal task-queue row (success, failed, stopped, removed)
    /// is retained before the task cleaner purges it, in hours
    #[clap(long, default_value = "24", env)]
    pub task_cleanup_interval_hours: u64,

    /// Directory daily meta.db backups are written to. Backups are skipped
    /// when unset or when running in memory mode.
    #[clap(long, env)]
    pub backup_dir: Option<std::path::PathBuf>,

    /// Number of daily backups to retain in `backup_dir`
    #[clap(long, default_value = "7", env)]
    pub max_backups: usize,

    /// In memory mode, how often meta.db and tasks.db are snapshotted to disk
    /// for crash recovery, in seconds
    #[clap(long, default_value = "900", env)]
    pub snapshot_interval_secs: u64,

    /// Number of on-disk snapshots to retain per database in memory mode
    #[clap(long, default_value = "10", env)]
    pub max_snapshots: usize,
}

impl Settings {
    #[cfg(test)]
    pub fn new_for_test() -> Self {
        Self {
            log_level: "debug".into(),
            ansi_logs: false,
            log_to_file: false,
            json_logs: false,
            root_dir: "./data".into(),
            memory_mode_enabled: true,
            metadata_cache_size: None,
            task_queue_cache_size: None,
            encrypt_password: "test-password-for-unit-tests".into(),
            dropbox_dir: "./data/dropbox".into(),
            attachment_dir: "./data/attachments".into(),
            max_attachment_bytes: 26_214_400,
            fetch_interval_secs: 3600,
            stuck_task_timeout_secs: 1800,
            reaper_interval_secs: 300,
            dispatch_interval_secs: 60,
            renewal_interval_secs: 3600,
            downgrade_interval_secs: 3600,
            downgrade_grace_days: 7,
            task_worker_concurrency: 4,
            http_timeout_secs: 30,
            llm_endpoint: "http://localhost:9000/v1/chat".into(),
            ocr_endpoint: "http://localhost:9001/v1/recognize".into(),
            task_cleanup_interval_hours: 24,
            backup_dir: None,
            max_backups: 7,
            snapshot_interval_secs: 900,
            max_snapshots: 10,
        }
    }
}
