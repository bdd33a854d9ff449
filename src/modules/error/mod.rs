// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use bb8::RunError;
use code::ErrorCode;
use snafu::{Location, Snafu};

use crate::raise_error;

pub mod code;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EngineError {
    #[snafu(display("{message}"))]
    Generic {
        message: String,
        #[snafu(implicit)]
        location: Location,
        code: ErrorCode,
    },
}

pub type EngineResult<T, E = EngineError> = std::result::Result<T, E>;

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Generic { code, .. } => *code,
        }
    }
}

impl From<RunError<EngineError>> for EngineError {
    fn from(e: RunError<EngineError>) -> Self {
        match e {
            RunError::User(e) => e,
            RunError::TimedOut => raise_error!(
                "timed out while attempting to acquire a connection from the pool".into(),
                ErrorCode::ConnectionPoolTimeout
            ),
        }
    }
}
