//! HTTP producer: POST the run input, stream the response through a codec.

use agentwire_codec::CodecKind;
use agentwire_event::RunAgentInput;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use tracing::debug;

use crate::{Agent, AgentError, EventStream};

/// A producer that talks to a remote agent endpoint over HTTP.
///
/// The run input is sent as a JSON POST body; the response body is an
/// endless byte stream fed through the negotiated codec. The `Accept`
/// header tells the endpoint which wire encoding to use.
#[derive(Debug, Clone)]
pub struct HttpAgent {
    client: reqwest::Client,
    endpoint: String,
    codec: CodecKind,
    headers: HeaderMap,
}

impl HttpAgent {
    /// Create a producer for the given endpoint URL, using the SSE codec.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            codec: CodecKind::default(),
            headers: HeaderMap::new(),
        }
    }

    /// Select the wire encoding to negotiate.
    pub fn with_codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    /// Use a preconfigured reqwest client (timeouts, proxies, TLS).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Attach a header to every run request, e.g. an authorization token.
    ///
    /// Invalid header names or values are ignored rather than deferred to
    /// request time.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }
}

#[async_trait]
impl Agent for HttpAgent {
    async fn run(&self, input: RunAgentInput) -> Result<EventStream, AgentError> {
        input.validate()?;

        debug!(endpoint = %self.endpoint, codec = ?self.codec, "starting run request");
        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header(ACCEPT, self.codec.content_type())
            .json(&input)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Http {
                status: status.as_u16(),
            });
        }

        let mut codec = self.codec.codec();
        let mut body = response.bytes_stream();
        let stream = async_stream::try_stream! {
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                for event in codec.feed(&chunk)? {
                    yield event;
                }
            }
        };
        Ok(Box::pin(stream))
    }
}
