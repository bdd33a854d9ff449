// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::{
    modules::{
        context::Initialize,
        error::{code::ErrorCode, EngineResult},
    },
    raise_error,
};

pub struct EngineTls;

impl Initialize for EngineTls {
    async fn initialize() -> EngineResult<()> {
        rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
            .map_err(|_| {
                raise_error!(
                    "failed to install default rustls crypto provider".into(),
                    ErrorCode::InternalError
                )
            })
    }
}
