//! Request and response shapes for Gemini's `generateContent`, and the
//! transport that carries them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capture::Frame;

pub(crate) const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub(crate) const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-09-2025";

#[derive(Debug, Clone, Serialize)]
pub(crate) struct GenerateContentRequest {
    pub(crate) contents: Vec<Content>,
}

impl GenerateContentRequest {
    /// A single-turn request carrying `parts` in order.
    pub(crate) fn single(parts: Vec<Part>) -> Self {
        Self {
            contents: vec![Content { parts }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct Content {
    pub(crate) parts: Vec<Part>,
}

/// Variant order matters for `#[serde(untagged)]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub(crate) enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

impl Part {
    pub(crate) fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

impl From<&Frame> for Part {
    fn from(frame: &Frame) -> Self {
        Self::InlineData {
            inline_data: InlineData {
                mime_type: frame.mime_type.clone(),
                data: frame.data.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    pub(crate) mime_type: String,
    pub(crate) data: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GenerateContentResponse {
    #[serde(default)]
    pub(crate) candidates: Vec<Candidate>,
    pub(crate) error: Option<ApiError>,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate, if any.
    pub(crate) fn first_text(&self) -> Option<&str> {
        self.candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .first()?
            .text
            .as_deref()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Candidate {
    pub(crate) content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseContent {
    #[serde(default)]
    pub(crate) parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponsePart {
    pub(crate) text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub(crate) code: Option<i64>,
    #[serde(default)]
    pub(crate) message: String,
    pub(crate) status: Option<String>,
}

/// Failure before a structured API reply was available.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub(crate) struct TransportError(pub(crate) String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.to_string())
    }
}

#[async_trait]
pub(crate) trait GenerativeTransport {
    async fn generate_content(
        &self,
        api_key: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, TransportError>;
}

pub(crate) struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub(crate) fn new(endpoint: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!(
                "{}/v1beta/models/{}:generateContent",
                endpoint.trim_end_matches('/'),
                model
            ),
        }
    }
}

#[async_trait]
impl GenerativeTransport for HttpTransport {
    async fn generate_content(
        &self,
        api_key: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, TransportError> {
        let parts: usize = request.contents.iter().map(|c| c.parts.len()).sum();
        info!(url = %self.url, parts, "calling Gemini");
        let response = self
            .client
            .post(&self.url)
            .query(&[("key", api_key)])
            .json(request)
            .send()
            .await?;
        let status = response.status();
        // Gemini reports API errors as JSON bodies on 4xx, so read the body regardless.
        let body = response.text().await?;
        debug!(%status, bytes = body.len(), "Gemini replied");
        serde_json::from_str(&body).map_err(|err| {
            TransportError(format!("unreadable response ({status}): {err}"))
        })
    }
}
