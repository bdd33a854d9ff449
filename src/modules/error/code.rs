// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side / configuration errors (10000-10999)
    InvalidParameter = 10000,
    ConfigError = 10010,
    MissingConfiguration = 10020,
    Incompatible = 10030,
    ExceedsLimitation = 10040,
    PayloadTooLarge = 10070,

    // Authorization / state errors (20000-20999)
    PermissionDenied = 20000,
    InsufficientCredits = 20010,
    StateMachineViolation = 20020,

    // Resource errors (30000-30999)
    ResourceNotFound = 30000,
    AlreadyExists = 30010,
    DataIntegrityError = 30020,

    // Network / transient errors (40000-40999)
    NetworkError = 40000,
    ConnectionTimeout = 40010,
    ConnectionPoolTimeout = 40020,
    TransientIOError = 40030,

    // External API / mail service errors (50000-50999)
    ExternalApiError = 50000,
    ImapCommandFailed = 50010,
    ImapAuthenticationFailed = 50020,
    MailboxNotFound = 50030,
    JiraApiError = 50040,
    LlmApiError = 50050,
    OcrApiError = 50060,
    WebhookDeliveryFailed = 50070,

    // Internal system errors (70000-70999)
    InternalError = 70000,
}
