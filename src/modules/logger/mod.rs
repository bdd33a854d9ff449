// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::logger::file::setup_file_logger;
use crate::modules::settings::SETTINGS;
use chrono::Local;
use std::process;
use tracing::Level;
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

mod file;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

pub fn initialize_logging() {
    if SETTINGS.log_to_file {
        setup_file_logger().expect("failed to install file logging subscriber");
    } else {
        setup_stdout_logger().expect("failed to install stdout logging subscriber");
    }
}

fn setup_stdout_logger() -> Result<(), tracing::dispatcher::SetGlobalDefaultError> {
    validate_log_level(&SETTINGS.log_level);
    let level = SETTINGS.log_level.parse::<Level>().unwrap();
    let with_ansi = SETTINGS.ansi_logs;

    if SETTINGS.json_logs {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stdout)
            .json()
            .finish();
        return tracing::subscriber::set_global_default(subscriber);
    }

    let format = tracing_subscriber::fmt::format()
        .with_level(true)
        .with_target(true)
        .with_timer(LocalTimer);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(with_ansi)
        .with_writer(std::io::stdout)
        .event_format(format)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}

fn validate_log_level(value: &str) {
    if value.parse::<Level>().is_err() {
        eprintln!(
            "invalid log level '{}'; use one of: error, warn, info, debug, trace",
            value
        );
        process::exit(1);
    }
}
