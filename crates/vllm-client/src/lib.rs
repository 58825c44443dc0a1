//! # vLLM Client
//!
//! Async client for the vLLM `/generate` API.
//!
//! ```no_run
//! use futures::StreamExt;
//! use vllm_client::{GenerationClient, SamplingParams};
//!
//! # async fn run() -> vllm_client::Result<()> {
//! let client = GenerationClient::new("http://127.0.0.1:8000")?;
//! let params = SamplingParams::builder()
//!     .n(2)
//!     .temperature(0.7)
//!     .max_tokens(200)
//!     .build()?;
//!
//! for text in client.generate("What are your favourite books?", &params).await? {
//!     println!("{text}");
//! }
//!
//! let mut stream = client.stream("Tell me a story.", &params).await?;
//! while let Some(frame) = stream.next().await {
//!     println!("{}", frame?[0].len());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod transport;

pub use client::GenerationClient;
pub use config::{ClientConfig, Endpoint, GENERATE_PATH};
pub use transport::{ByteStream, HttpTransport, Transport};

pub use vllm_client_core::{
    CancellationToken, EarlyStopping, Error, Extensions, FrameStream, GenerationFrame,
    GenerationRequest, RequestId, Result, SamplingMode, SamplingParams, SamplingParamsBuilder,
};
