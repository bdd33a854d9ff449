// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use crate::modules::error::code::ErrorCode;
use crate::modules::error::EngineResult;
use crate::modules::settings::SETTINGS;
use crate::raise_error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The seam [`super::engine::IssueEngine`] creates/attaches through (spec
/// §6), kept separate from the concrete [`JiraClient`] so tests can swap in
/// a fake tracker the same way [`crate::modules::capability::mock`] stands
/// in for a real LLM/OCR vendor.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_issue(
        &self,
        project_key: &str,
        summary: &str,
        issue_type: &str,
        description: &str,
        assignee: Option<&str>,
        priority: Option<&str>,
        epic_link: Option<&str>,
    ) -> EngineResult<String>;

    async fn add_attachment(&self, issue_key: &str, file_path: &str) -> EngineResult<()>;
}

/// `Jira.createIssue`/`Jira.addAttachment` (spec §6), speaking the real
/// JIRA Cloud REST API (`/rest/api/2/issue`, `/rest/api/2/issue/{id}/attachments`)
/// with HTTP basic auth, built the same way the teacher's `hook::http::HttpClient`
/// wraps a single `reqwest::Client` per outbound integration.
pub struct JiraClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    api_token: String,
}

#[derive(Serialize)]
struct CreateIssueRequest {
    fields: CreateIssueFields,
}

#[derive(Serialize)]
struct CreateIssueFields {
    project: ProjectRef,
    summary: String,
    description: String,
    issuetype: IssueTypeRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<PriorityRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assignee: Option<AssigneeRef>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "customfield_10014")]
    epic_link: Option<String>,
}

#[derive(Serialize)]
struct ProjectRef {
    key: String,
}

#[derive(Serialize)]
struct IssueTypeRef {
    name: String,
}

#[derive(Serialize)]
struct PriorityRef {
    name: String,
}

#[derive(Serialize)]
struct AssigneeRef {
    name: String,
}

#[derive(Deserialize)]
struct CreateIssueResponse {
    key: String,
}

impl JiraClient {
    pub fn new(base_url: String, username: String, api_token: String) -> EngineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SETTINGS.http_timeout_secs))
            .build()
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::InternalError))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username,
            api_token,
        })
    }

    /// Returns the `external_id` (e.g. `PROJ-123`) of the created issue.
    pub async fn create_issue(
        &self,
        project_key: &str,
        summary: &str,
        issue_type: &str,
        description: &str,
        assignee: Option<&str>,
        priority: Option<&str>,
        epic_link: Option<&str>,
    ) -> EngineResult<String> {
        let body = CreateIssueRequest {
            fields: CreateIssueFields {
                project: ProjectRef {
                    key: project_key.to_string(),
                },
                summary: summary.to_string(),
                description: description.to_string(),
                issuetype: IssueTypeRef {
                    name: issue_type.to_string(),
                },
                priority: priority.map(|p| PriorityRef { name: p.to_string() }),
                assignee: assignee.map(|a| AssigneeRef { name: a.to_string() }),
                epic_link: epic_link.map(str::to_string),
            },
        };

        let response = self
            .client
            .post(format!("{}/rest/api/2/issue", self.base_url))
            .basic_auth(&self.username, Some(&self.api_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::JiraApiError))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(raise_error!(
                format!("JIRA createIssue failed ({status}): {text}"),
                ErrorCode::JiraApiError
            ));
        }

        let parsed: CreateIssueResponse = response
            .json()
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::JiraApiError))?;
        Ok(parsed.key)
    }

    /// Uploads one file as an attachment on an existing issue. Per-file
    /// failures are the caller's (the issue engine's) responsibility to
    /// record in `upload_result` rather than abort the run (spec §4.4
    /// "Attachment upload policy").
    pub async fn add_attachment(&self, issue_key: &str, file_path: &str) -> EngineResult<()> {
        let bytes = tokio::fs::read(file_path)
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::TransientIOError))?;
        let filename = std::path::Path::new(file_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!(
                "{}/rest/api/2/issue/{}/attachments",
                self.base_url, issue_key
            ))
            .basic_auth(&self.username, Some(&self.api_token))
            .header("X-Atlassian-Token", "no-check")
            .multipart(form)
            .send()
            .await
            .map_err(|e| raise_error!(format!("{:#?}", e), ErrorCode::JiraApiError))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(raise_error!(
                format!("JIRA addAttachment failed ({status}): {text}"),
                ErrorCode::JiraApiError
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn create_issue(
        &self,
        project_key: &str,
        summary: &str,
        issue_type: &str,
        description: &str,
        assignee: Option<&str>,
        priority: Option<&str>,
        epic_link: Option<&str>,
    ) -> EngineResult<String> {
        JiraClient::create_issue(
            self,
            project_key,
            summary,
            issue_type,
            description,
            assignee,
            priority,
            epic_link,
        )
        .await
    }

    async fn add_attachment(&self, issue_key: &str, file_path: &str) -> EngineResult<()> {
        JiraClient::add_attachment(self, issue_key, file_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_strips_a_trailing_slash_from_the_base_url() {
        let client = JiraClient::new(
            "https://issues.example.com/".to_string(),
            "bot@example.com".to_string(),
            "token".to_string(),
        )
        .unwrap();
        assert_eq!(client.base_url, "https://issues.example.com");
    }

    #[tokio::test]
    async fn add_attachment_fails_fast_on_a_missing_file_without_reaching_the_network() {
        let client = JiraClient::new(
            "https://issues.example.com".to_string(),
            "bot@example.com".to_string(),
            "token".to_string(),
        )
        .unwrap();
        let outcome = client.add_attachment("PROJ-1", "/no/such/file/here.png").await;
        assert!(outcome.is_err());
    }
}
