use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use http::header::{ACCEPT, CONTENT_TYPE};

use crate::config::{ModelConfig, RequestConfig};
use crate::error::ClientError;
use crate::protocol::chat::{ChatRequest, CompletionResult, Message};
use crate::protocol::response::parse_completion_response;
use crate::stream::{DecodeOutcome, StreamDecoder, StreamEvent, DEFAULT_MAX_LINE_BYTES};

const UPSTREAM_ERROR_BODY_LIMIT: usize = 512;
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Decoder over a live HTTP response body.
pub type ResponseDecoder = StreamDecoder<BoxStream<'static, reqwest::Result<Bytes>>>;

fn build_reqwest_client(connect_timeout: Duration) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .tcp_nodelay(true)
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|err| ClientError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// HTTP client for an OpenAI-compatible chat completion endpoint.
///
/// The endpoint and credentials come from the [`ModelConfig`] passed to each
/// call, so one client serves every configured model.
#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    request_timeout: Duration,
    max_line_bytes: usize,
}

impl ChatClient {
    /// Build a client from request settings.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when the TLS backend cannot be set up.
    pub fn new(config: &RequestConfig) -> Result<Self, ClientError> {
        let client = build_reqwest_client(Duration::from_secs(config.connect_timeout_secs))?;
        Ok(Self {
            client,
            request_timeout: Duration::from_secs(config.timeout_secs),
            max_line_bytes: config.max_line_bytes,
        })
    }

    /// Wrap an existing `reqwest` client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    async fn post(
        &self,
        model: &ModelConfig,
        request: &ChatRequest,
    ) -> Result<reqwest::Response, ClientError> {
        let body = serde_json::to_vec(request)
            .map_err(|err| ClientError::Decode(format!("failed to encode request: {err}")))?;

        let mut builder = self
            .client
            .post(&model.url)
            .bearer_auth(&model.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if request.stream {
            builder = builder.header(ACCEPT, "text/event-stream");
        } else {
            // No overall deadline on streamed bodies.
            builder = builder.timeout(self.request_timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| ClientError::Transport(format!("request to {} failed: {err}", model.url)))?;

        let status = response.status();
        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            if message.len() > UPSTREAM_ERROR_BODY_LIMIT {
                let mut cut = UPSTREAM_ERROR_BODY_LIMIT;
                while !message.is_char_boundary(cut) {
                    cut -= 1;
                }
                message.truncate(cut);
            }
            tracing::warn!(status = status.as_u16(), model = %model.model, "upstream rejected request");
            return Err(ClientError::Upstream {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// Send a non-streaming request and parse the buffered answer.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection failure, non-2xx status, or an
    /// unparseable body.
    pub async fn complete(
        &self,
        model: &ModelConfig,
        messages: Vec<Message>,
        temperature: f64,
    ) -> Result<CompletionResult, ClientError> {
        let request = ChatRequest::non_streaming(model, messages, temperature);
        let response = self.post(model, &request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|err| ClientError::Transport(format!("failed to read response body: {err}")))?;
        parse_completion_response(&body)
    }

    /// Send a streaming request and return a decoder over the response body.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection failure or non-2xx status.
    pub async fn open_stream(
        &self,
        model: &ModelConfig,
        messages: Vec<Message>,
        temperature: f64,
    ) -> Result<ResponseDecoder, ClientError> {
        let request = ChatRequest::streaming(model, messages, temperature);
        let response = self.post(model, &request).await?;
        tracing::debug!(model = %model.model, "completion stream opened");
        Ok(StreamDecoder::with_max_line_bytes(
            response.bytes_stream().boxed(),
            self.max_line_bytes,
        ))
    }

    /// Send a streaming request and decode it to completion, handing each
    /// event to `on_event` as it arrives.
    ///
    /// # Errors
    ///
    /// Returns a [`ClientError`] on connection failure, non-2xx status, or a
    /// failed body read.
    pub async fn complete_streaming<F>(
        &self,
        model: &ModelConfig,
        messages: Vec<Message>,
        temperature: f64,
        on_event: F,
    ) -> Result<DecodeOutcome, ClientError>
    where
        F: FnMut(StreamEvent),
    {
        let decoder = self.open_stream(model, messages, temperature).await?;
        Ok(decoder.run(on_event).await?)
    }
}
