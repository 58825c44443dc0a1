//! Generation client orchestrating encoding, transport and decoding.

use vllm_client_core::streaming::DEFAULT_BUFFER_CAPACITY;
use vllm_client_core::{
    decode_response, decode_stream, CancellationToken, Error, FrameStream, GenerationRequest,
    Result, SamplingParams,
};

use crate::config::{ClientConfig, Endpoint};
use crate::transport::{HttpTransport, Transport};

/// Async client for the vLLM generate API.
///
/// Calls share nothing but the transport, so one client can serve many
/// concurrent calls.
#[derive(Debug, Clone)]
pub struct GenerationClient<T = HttpTransport> {
    endpoint: Endpoint,
    transport: T,
    stream_buffer_capacity: usize,
}

impl GenerationClient<HttpTransport> {
    /// Creates a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the URL is not allowed, for example
    /// because it already ends in `/generate`.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::from_config(&ClientConfig::new(base_url))
    }

    /// Creates a client from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a setting is invalid.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint()?;
        let transport = HttpTransport::from_config(config)?;

        tracing::debug!(endpoint = %endpoint, "Created generation client");

        Ok(Self {
            endpoint,
            transport,
            stream_buffer_capacity: config.stream_buffer_capacity,
        })
    }
}

impl<T: Transport> GenerationClient<T> {
    /// Creates a client that sends requests through `transport`.
    pub fn with_transport(endpoint: Endpoint, transport: T) -> Self {
        Self {
            endpoint,
            transport,
            stream_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }

    /// Sets the initial stream buffer capacity (at least 1 byte).
    #[must_use]
    pub fn with_stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity.max(1);
        self
    }

    /// Returns the endpoint requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Generates completions for `prompt` and waits for all of them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the server cannot be reached or
    /// answers with an error status, and [`Error::Protocol`] if the response
    /// is malformed.
    pub async fn generate(
        &self,
        prompt: impl Into<String>,
        params: &SamplingParams,
    ) -> Result<Vec<String>> {
        let request = GenerationRequest::new(prompt, params.clone());
        self.generate_with(request, &CancellationToken::new()).await
    }

    /// Sends a non-streaming request, honouring `cancel` while waiting.
    ///
    /// # Errors
    ///
    /// As [`GenerationClient::generate`], plus [`Error::Cancelled`] if
    /// `cancel` fires before the response arrives.
    pub async fn generate_with(
        &self,
        request: GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let request = request.with_stream(false);
        let body = request.encode()?;

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tracing::debug!(
            request_id = %request.request_id,
            endpoint = %self.endpoint,
            n = request.params.n(),
            "Sending generate request"
        );

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(request_id = %request.request_id, "Generate request cancelled");
                return Err(Error::Cancelled);
            }
            response = self.transport.post(self.endpoint.generate_url(), &body) => response?,
        };

        let texts = match decode_response(&response) {
            Ok(texts) => texts,
            Err(e) => {
                tracing::warn!(request_id = %request.request_id, error = %e, "Malformed response");
                return Err(e);
            }
        };

        tracing::debug!(
            request_id = %request.request_id,
            completions = texts.len(),
            "Generate request completed"
        );
        Ok(texts)
    }

    /// Starts a streaming generation for `prompt`.
    ///
    /// Each yielded frame holds the cumulative text of every completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the request cannot be sent. Errors
    /// after the response starts are yielded by the stream.
    pub async fn stream(
        &self,
        prompt: impl Into<String>,
        params: &SamplingParams,
    ) -> Result<FrameStream> {
        let request = GenerationRequest::new(prompt, params.clone());
        self.stream_with(request, CancellationToken::new()).await
    }

    /// Starts a streaming request that ends quietly once `cancel` fires.
    ///
    /// # Errors
    ///
    /// As [`GenerationClient::stream`].
    pub async fn stream_with(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<FrameStream> {
        let request = request.with_stream(true);
        let body = request.encode()?;

        if cancel.is_cancelled() {
            return Ok(FrameStream::empty());
        }

        tracing::debug!(
            request_id = %request.request_id,
            endpoint = %self.endpoint,
            n = request.params.n(),
            "Sending streaming generate request"
        );

        let source = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!(request_id = %request.request_id, "Streaming request cancelled");
                return Ok(FrameStream::empty());
            }
            source = self.transport.post_streaming(self.endpoint.generate_url(), &body) => source?,
        };

        Ok(decode_stream(source, cancel, self.stream_buffer_capacity))
    }
}
