//! HTTP transport used by the generation client.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Url;
use serde_json::{Map, Value};

use vllm_client_core::{Error, Result};

use crate::config::ClientConfig;

/// Response body delivered chunk by chunk.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Trait for anything that can POST a JSON body to the server.
///
/// Failures (connection errors, non-success status codes) are reported as
/// [`Error::Transport`] carrying the original error.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Posts `body` and returns the complete response body.
    async fn post(&self, url: &Url, body: &Map<String, Value>) -> Result<Bytes>;

    /// Posts `body` and returns the response body as a chunk stream.
    async fn post_streaming(&self, url: &Url, body: &Map<String, Value>) -> Result<ByteStream>;
}

/// [`Transport`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with the timeouts from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout is invalid or the client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout()? {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout()? {
            builder = builder.connect_timeout(timeout);
        }

        let client = builder.build().map_err(Error::transport)?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest` client.
    #[must_use]
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(&self, url: &Url, body: &Map<String, Value>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(Error::transport)?;

        let status = response.status();
        tracing::debug!(url = %url, status = %status, "Received response");

        response.error_for_status().map_err(Error::transport)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(&self, url: &Url, body: &Map<String, Value>) -> Result<Bytes> {
        self.send(url, body)
            .await?
            .bytes()
            .await
            .map_err(Error::transport)
    }

    async fn post_streaming(&self, url: &Url, body: &Map<String, Value>) -> Result<ByteStream> {
        let response = self.send(url, body).await?;
        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(Error::transport)),
        ))
    }
}
