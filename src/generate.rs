use thiserror::Error;
use tracing::{debug, info, warn, Level};

use crate::capture::{sample_frames, CaptureError, FrameSet, SamplerSettings};
use crate::gemini::{
    GenerateContentRequest, GenerateContentResponse, GenerativeTransport, Part, TransportError,
};
use crate::media::MediaInput;
use crate::prompt;

const INVALID_KEY_MARKER: &str = "API key not valid";

#[derive(Debug, Error)]
pub(crate) enum GenerateError {
    #[error("Enter your Google Gemini API key first.")]
    MissingCredential,
    #[error(transparent)]
    EmptyInput(#[from] EmptyInput),
    #[error("The API key is not valid. Check it at https://aistudio.google.com/app/apikey and try again.")]
    InvalidCredential,
    #[error("{0}")]
    Upstream(String),
    #[error("Could not reach Gemini: {0}")]
    Transport(#[from] TransportError),
    #[error("Could not capture frames: {0}")]
    Capture(#[from] CaptureError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum EmptyInput {
    #[error("There is nothing to analyze.")]
    NoVisual,
    #[error("Enter a keyword first.")]
    NoKeyword,
}

/// The two request shapes, each paired with its own instruction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GenerationRequest {
    Visual { frames: FrameSet },
    Text { keyword: String },
}

impl GenerationRequest {
    pub(crate) fn to_payload(&self) -> GenerateContentRequest {
        let parts = match self {
            GenerationRequest::Visual { frames } => frames
                .iter()
                .map(Part::from)
                .chain([Part::text(prompt::visual_instruction())])
                .collect(),
            GenerationRequest::Text { keyword } => vec![Part::text(prompt::text_instruction(keyword))],
        };
        GenerateContentRequest::single(parts)
    }
}

#[derive(Debug)]
pub(crate) struct Generation {
    pub(crate) text: String,
    /// Frames that were sent; empty for keyword requests.
    pub(crate) frames: FrameSet,
}

/// Runs one prompt generation cycle against `transport`.
///
/// Holds no lock; callers must not overlap cycles.
pub(crate) struct Generator<T> {
    transport: T,
    sampler: SamplerSettings,
}

impl<T: GenerativeTransport> Generator<T> {
    pub(crate) fn new(transport: T, sampler: SamplerSettings) -> Self {
        Self { transport, sampler }
    }

    pub(crate) async fn generate(
        &self,
        credential: &str,
        input: &mut MediaInput,
    ) -> Result<Generation, GenerateError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(GenerateError::MissingCredential);
        }

        let request = self.prepare(input).await?;
        let payload = request.to_payload();
        let response = self.transport.generate_content(credential, &payload).await?;
        let text = interpret(response)?;

        let frames = match request {
            GenerationRequest::Visual { frames } => frames,
            GenerationRequest::Text { .. } => Vec::new(),
        };
        info!(chars = text.len(), frames = frames.len(), "prompt generated");
        Ok(Generation { text, frames })
    }

    async fn prepare(&self, input: &mut MediaInput) -> Result<GenerationRequest, GenerateError> {
        let frames = match input {
            MediaInput::Video(video) => sample_frames(video.as_mut(), &self.sampler).await?,
            MediaInput::Image(still) if still.data.is_empty() => Vec::new(),
            MediaInput::Image(still) => vec![still.clone()],
            MediaInput::Text(keyword) => {
                if keyword.trim().is_empty() {
                    return Err(EmptyInput::NoKeyword.into());
                }
                return Ok(GenerationRequest::Text {
                    keyword: keyword.clone(),
                });
            }
        };
        if frames.is_empty() {
            return Err(EmptyInput::NoVisual.into());
        }
        debug!(frames = frames.len(), "prepared visual request");
        Ok(GenerationRequest::Visual { frames })
    }
}

/// Maps a Gemini reply to prompt text or a classified error.
pub(crate) fn interpret(mut response: GenerateContentResponse) -> Result<String, GenerateError> {
    if let Some(error) = response.error.take() {
        warn!(code = ?error.code, status = ?error.status, message = %error.message, "Gemini rejected the request");
        if error.message.contains(INVALID_KEY_MARKER) {
            return Err(GenerateError::InvalidCredential);
        }
        return Err(GenerateError::Upstream(error.message));
    }

    let text = strip_code_fences(response.first_text().unwrap_or_default());
    if tracing::enabled!(Level::DEBUG)
        && serde_json::from_str::<serde_json::Value>(&text).is_err()
    {
        debug!("model reply is not well-formed JSON, passing it through");
    }
    Ok(text)
}

/// Drops every markdown fence marker and surrounding whitespace.
pub(crate) fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_owned()
}
