//! Decoding of generate responses.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{GenerationFrame, MISSING_TEXT};

/// Decodes a complete non-streaming response body into completion texts.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the body is not a JSON object with a
/// `text` array of strings (or nulls).
pub fn decode_response(body: &[u8]) -> Result<Vec<String>> {
    decode_frame(body).map(GenerationFrame::into_texts)
}

/// Decodes one JSON object of shape `{"text": [...]}` into a frame.
///
/// Shared by the non-streaming path and by each delimited stream frame.
///
/// # Errors
///
/// Returns [`Error::Protocol`] describing which expectation failed.
pub fn decode_frame(body: &[u8]) -> Result<GenerationFrame> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| Error::protocol(format!("invalid server response (not JSON: {e})")))?;

    let Value::Object(mut object) = value else {
        return Err(Error::protocol(
            "invalid server response (not a JSON object)",
        ));
    };

    let Some(text) = object.remove("text") else {
        return Err(Error::protocol(
            "invalid server response (does not have a \"text\" item)",
        ));
    };

    let Value::Array(items) = text else {
        return Err(Error::protocol(
            "invalid server response (\"text\" item is not an array)",
        ));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::String(s) => Ok(s),
            Value::Null => Ok(MISSING_TEXT.to_string()),
            other => Err(Error::protocol(format!(
                "invalid server response (\"text\" item {index} is not a string: {other})"
            ))),
        })
        .collect::<Result<Vec<_>>>()
        .map(GenerationFrame::new)
}
