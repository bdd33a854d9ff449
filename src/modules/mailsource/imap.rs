// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

//! The IMAP `MailSource` (spec §4.1/§6): `LOGIN`, `SELECT`, `SEARCH`,
//! `FETCH(RFC822)` against a user's own mailbox. Deliberately simplified
//! relative to the teacher's `imap::{pool, client, session}` trio: no proxy
//! support, no OAuth2, no connection-stats wrapper, no capability probing.
//! This engine polls one mailbox per `EmailConfig`, not a multi-tenant
//! cache, so a short-lived, single connection per fetch is enough.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineResult;
use crate::modules::mailsource::{parse_rfc822, RawEmail};
use crate::modules::user::entity::{FetchFilters, ImapConnectionConfig};
use crate::raise_error;
use async_imap::types::Fetch;
use async_imap::Session;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

trait MailStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> MailStream for T {}

fn tls_connector() -> EngineResult<TlsConnector> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

async fn connect(config: &ImapConnectionConfig) -> EngineResult<Session<Box<dyn MailStream>>> {
    let address = format!("{}:{}", config.host, config.port)
        .to_socket_addrs()
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::NetworkError))?
        .next()
        .ok_or_else(|| raise_error!("unable to resolve IMAP host".to_string(), ErrorCode::NetworkError))?;

    let tcp = tokio::net::TcpStream::connect(address)
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ConnectionTimeout))?;

    let stream: Box<dyn MailStream> = if config.ssl {
        let connector = tls_connector()?;
        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InvalidParameter))?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?;
        Box::new(tls)
    } else {
        Box::new(tcp)
    };

    let client = async_imap::Client::new(stream);
    let password = config.password()?;
    let session = client
        .login(&config.username, &password)
        .await
        .map_err(|(e, _)| raise_error!(format!("{:#?}", e), ErrorCode::ImapAuthenticationFailed))?;
    Ok(session)
}

fn build_search_expression(filters: &FetchFilters, since: i64) -> String {
    let mut terms = Vec::new();
    if filters.unseen_only {
        terms.push("UNSEEN".to_string());
    }
    if let Some(from) = &filters.from {
        terms.push(format!("FROM \"{}\"", from.replace('"', "")));
    }
    if let Some(subject) = &filters.subject {
        terms.push(format!("SUBJECT \"{}\"", subject.replace('"', "")));
    }
    let since_date = imap_date(since);
    terms.push(format!("SINCE {since_date}"));
    terms.join(" ")
}

fn imap_date(timestamp_millis: i64) -> String {
    let dt = chrono::DateTime::from_timestamp(timestamp_millis / 1000, 0).unwrap_or_default();
    dt.format("%d-%b-%Y").to_string()
}

/// Fetches every message matching `filters` and `since` from `folder`,
/// returning `(emails, new_cursor)` where `new_cursor = max(received_at)`
/// over the successfully parsed messages (spec §4.1). A single malformed
/// message is logged and skipped rather than aborting the whole fetch.
pub async fn fetch(
    config: &ImapConnectionConfig,
    filters: &FetchFilters,
    since: i64,
) -> EngineResult<(Vec<RawEmail>, Option<i64>)> {
    let mut session = connect(config).await?;

    session
        .select(&config.folder)
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::MailboxNotFound))?;

    let search_expr = build_search_expression(filters, since);
    let uids = session
        .uid_search(&search_expr)
        .await
        .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?;

    if uids.is_empty() {
        let _ = session.logout().await;
        return Ok((Vec::new(), None));
    }

    let uid_set = uids
        .iter()
        .map(|uid| uid.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let mut emails = Vec::new();
    let mut new_cursor = None;

    {
        let mut stream = session
            .uid_fetch(&uid_set, "RFC822")
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::ImapCommandFailed))?;

        use futures::StreamExt;
        while let Some(result) = stream.next().await {
            let fetch: Fetch = match result {
                Ok(f) => f,
                Err(e) => {
                    warn!("IMAP FETCH item failed: {:#?}", e);
                    continue;
                }
            };
            let Some(body) = fetch.body() else {
                continue;
            };
            match parse_rfc822(body) {
                Ok(raw) => {
                    new_cursor = Some(new_cursor.unwrap_or(raw.received_at).max(raw.received_at));
                    emails.push(raw);
                }
                Err(e) => {
                    warn!("skipping malformed message: {:#?}", e);
                }
            }
        }
    }

    debug!("fetched {} messages from {}@{}", emails.len(), config.username, config.host);

    if let Err(e) = session.logout().await {
        warn!("IMAP logout failed: {:#?}", e);
    }

    Ok((emails, new_cursor))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imap_date_formats_as_dd_mon_yyyy() {
        // 2024-03-05T00:00:00Z
        assert_eq!(imap_date(1_709_596_800_000), "05-Mar-2024");
    }

    #[test]
    fn build_search_expression_combines_unseen_from_subject_and_since() {
        let filters = FetchFilters {
            unseen_only: true,
            from: Some("boss@example.com".to_string()),
            subject: Some("urgent".to_string()),
        };
        let expr = build_search_expression(&filters, 1_709_596_800_000);
        assert_eq!(expr, "UNSEEN FROM \"boss@example.com\" SUBJECT \"urgent\" SINCE 05-Mar-2024");
    }

    #[test]
    fn build_search_expression_strips_embedded_quotes_and_omits_absent_filters() {
        let filters = FetchFilters {
            unseen_only: false,
            from: Some("\"quoted\"@example.com".to_string()),
            subject: None,
        };
        let expr = build_search_expression(&filters, 1_709_596_800_000);
        assert_eq!(expr, "FROM \"quoted@example.com\" SINCE 05-Mar-2024");
    }
}
