//! HTTP client for the document-assistant service: question answering and
//! automatic analysis over extracted document text.

use std::time::Duration;

use reqwest::multipart::Form;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default bounded wait for an assistant answer.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior turn of the assistant conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AssistError {
    /// The request could not be established or was dropped mid-flight.
    #[error("connection failure: {0}")]
    Connectivity(String),
    /// The service reported a failure.
    #[error("assistant service error: {0}")]
    Service(String),
    /// A success payload that could not be decoded.
    #[error("unexpected response format: {0}")]
    Format(String),
}

#[derive(Debug, Deserialize)]
struct AssistResponse {
    success: bool,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    analysis: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the document-assistant endpoints.
pub struct AssistantClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl AssistantClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    /// Ask a question about the extracted text, with optional conversation
    /// history for follow-ups.
    pub async fn chat(
        &self,
        message: &str,
        extracted_text: &str,
        document_name: &str,
        history: &[ChatTurn],
    ) -> Result<String, AssistError> {
        let history_json =
            serde_json::to_string(history).map_err(|e| AssistError::Format(e.to_string()))?;
        let form = Form::new()
            .text("message", message.to_string())
            .text("extracted_text", extracted_text.to_string())
            .text("document_name", document_name.to_string())
            .text("conversation_history", history_json);

        debug!(document = document_name, turns = history.len(), "sending chat request");
        let body = self.post("chat/", form).await?;
        body.response
            .ok_or_else(|| AssistError::Format("missing response field".to_string()))
    }

    /// Run an automatic analysis (e.g. `"summary"`) over the extracted text.
    pub async fn analyze(
        &self,
        extracted_text: &str,
        document_name: &str,
        analysis_type: &str,
    ) -> Result<String, AssistError> {
        let form = Form::new()
            .text("extracted_text", extracted_text.to_string())
            .text("document_name", document_name.to_string())
            .text("analysis_type", analysis_type.to_string());

        debug!(document = document_name, analysis_type, "sending analysis request");
        let body = self.post("analyze/", form).await?;
        body.analysis
            .ok_or_else(|| AssistError::Format("missing analysis field".to_string()))
    }

    async fn post(&self, path: &str, form: Form) -> Result<AssistResponse, AssistError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AssistError::Connectivity(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<AssistResponse>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(AssistError::Service(message));
        }

        let body: AssistResponse = response
            .json()
            .await
            .map_err(|e| AssistError::Format(e.to_string()))?;
        if !body.success {
            return Err(AssistError::Service(
                body.error.unwrap_or_else(|| "request failed".to_string()),
            ));
        }
        Ok(body)
    }
}
