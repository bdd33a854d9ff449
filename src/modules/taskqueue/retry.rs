// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

#[derive(Clone, Copy, Debug)]
pub enum RetryStrategy {
    Linear { interval: u32 },
    Exponential { base: u32 },
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub strategy: RetryStrategy,
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    /// Seconds to wait before the next attempt, given the attempt number (1-based).
    pub fn wait_time(&self, attempt: u32) -> u64 {
        match self.strategy {
            RetryStrategy::Linear { interval } => interval as u64,
            RetryStrategy::Exponential { base } => (base as u64).saturating_pow(attempt),
        }
    }
}
