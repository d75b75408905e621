//! A [`Generator`] for OpenAI-compatible chat completion APIs.
//!
//! Besides OpenAI itself this covers Gemini (through its OpenAI
//! compatibility endpoint) and a local Ollama server (`/v1`), see the
//! presets on [`OpenAIConfigBuilder`].

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use mime::Mime;
use ragdeck_model::{ErrorKind, GenerationRequest, Generator, ProviderError};
use reqwest::{Client, Response, StatusCode, header};

pub use config::{OpenAIConfig, OpenAIConfigBuilder};
use io::{Chunks, Sse};
pub use response::OpenAIStream;

/// Error type for [`OpenAIGenerator`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

/// OpenAI-compatible text generator.
#[derive(Clone, Debug)]
pub struct OpenAIGenerator {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAIGenerator {
    /// Creates a new `OpenAIGenerator` with the given configuration.
    #[inline]
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    /// Returns the configuration of this generator.
    #[inline]
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }
}

impl Generator for OpenAIGenerator {
    type Error = Error;
    type Stream = OpenAIStream;

    fn generate(
        &self,
        req: &GenerationRequest,
    ) -> impl Future<Output = Result<Self::Stream, Self::Error>> + Send + 'static
    {
        let openai_req = proto::create_request(req, &self.config);
        let model = self.config.model.clone();
        let resp_fut = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .header(header::ACCEPT, "text/event-stream")
            .json(&openai_req)
            .send();

        async move {
            debug!(model = %model, "sending chat completion request");
            let resp = resp_fut.await.map_err(|err| {
                let kind = if err.is_connect() || err.is_timeout() {
                    ErrorKind::Unavailable
                } else {
                    ErrorKind::Other
                };
                Error::new(err.to_string(), kind)
            })?;
            let resp = check_status(resp).await?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse::<Mime>().ok())
                .is_some_and(|m| {
                    m.type_() == mime::TEXT
                        && m.subtype().as_str() == "event-stream"
                });
            if !is_event_stream {
                return Err(Error::new(
                    format!("unexpected content type: {content_type:?}"),
                    ErrorKind::InvalidResponse,
                ));
            }

            Ok(OpenAIStream::from_sse(Sse::new(Chunks::from_response(resp))))
        }
    }
}

async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let kind = match status {
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimitExceeded,
        StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => ErrorKind::Unavailable,
        _ => ErrorKind::Other,
    };
    // Prefer the provider's own explanation when the body has one.
    let body = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<proto::ErrorBody>(&body)
        .map(|body| body.error.message)
        .unwrap_or(body);
    let message = if detail.trim().is_empty() {
        format!("request failed with status {status}")
    } else {
        format!("request failed with status {status}: {}", detail.trim())
    };
    Err(Error::new(message, kind))
}
