//! # vLLM Client Core
//!
//! Protocol layer for the vLLM `/generate` API, free of any HTTP dependency.
//!
//! This crate provides:
//! - Validated sampling parameters and the mode rules they obey
//! - Encoding of generation requests into the wire body
//! - Decoding of complete responses and of NUL-delimited frame streams
//! - Cooperative cancellation for in-flight calls

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cancellation;
pub mod error;
pub mod request;
pub mod response;
pub mod sampling;
pub mod streaming;
pub mod types;

pub use cancellation::CancellationToken;
pub use error::{BoxError, Error, Result};
pub use request::{encode_request, Extensions, GenerationRequest};
pub use response::{decode_frame, decode_response};
pub use sampling::{EarlyStopping, SamplingMode, SamplingParams, SamplingParamsBuilder};
pub use streaming::{decode_stream, FrameDecoder, FrameStream, StreamBuffer};
pub use types::{GenerationFrame, RequestId};
