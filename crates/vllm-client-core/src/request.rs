//! Request types and wire encoding for the generate endpoint.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::sampling::{EarlyStopping, SamplingParams};
use crate::types::RequestId;

/// Extra top-level fields merged into the request body.
pub type Extensions = Map<String, Value>;

/// Request for text generation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Identifier used in logs; never sent to the server.
    pub request_id: RequestId,

    /// Input prompt.
    pub prompt: String,

    /// Sampling parameters.
    pub params: SamplingParams,

    /// Whether the server should stream frames.
    pub stream: bool,

    /// Extra fields, merged over the fixed ones.
    pub extensions: Option<Extensions>,
}

impl GenerationRequest {
    /// Creates a non-streaming request for `prompt`.
    #[must_use]
    pub fn new(prompt: impl Into<String>, params: SamplingParams) -> Self {
        Self {
            request_id: RequestId::new(),
            prompt: prompt.into(),
            params,
            stream: false,
            extensions: None,
        }
    }

    /// Sets the streaming flag.
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Adds one extension field.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// Replaces all extension fields.
    #[must_use]
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = Some(extensions);
        self
    }

    /// Encodes this request into the JSON body sent to the server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the body cannot be built.
    pub fn encode(&self) -> Result<Map<String, Value>> {
        encode_request(
            &self.prompt,
            &self.params,
            self.stream,
            self.extensions.as_ref(),
        )
    }
}

/// `stop` is sent as null, a bare string, or an array depending on its length.
#[derive(Serialize)]
#[serde(untagged)]
enum StopField<'a> {
    One(&'a str),
    Many(&'a [String]),
}

impl<'a> StopField<'a> {
    fn from_slice(stop: &'a [String]) -> Option<Self> {
        match stop {
            [] => None,
            [single] => Some(Self::One(single)),
            many => Some(Self::Many(many)),
        }
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    prompt: &'a str,
    stream: bool,
    n: u32,
    best_of: Option<u32>,
    presence_penalty: f64,
    frequency_penalty: f64,
    repetition_penalty: f64,
    temperature: f64,
    top_p: f64,
    top_k: i32,
    min_p: f64,
    use_beam_search: bool,
    length_penalty: f64,
    early_stopping: EarlyStopping,
    stop: Option<StopField<'a>>,
    stop_token_ids: Option<&'a [u32]>,
    include_stop_str_in_output: bool,
    ignore_eos: bool,
    max_tokens: u32,
    logprobs: Option<u32>,
    prompt_logprobs: Option<u32>,
    skip_special_tokens: bool,
    spaces_between_special_tokens: bool,
}

/// Builds the request body for the generate endpoint.
///
/// Every fixed key is present, with an explicit `null` where there is no
/// value. Extension entries override fixed keys, except `early_stopping`,
/// which is always derived from `params`.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the body cannot be built.
pub fn encode_request(
    prompt: &str,
    params: &SamplingParams,
    stream: bool,
    extensions: Option<&Extensions>,
) -> Result<Map<String, Value>> {
    let stop_token_ids = params.stop_token_ids();
    let payload = Payload {
        prompt,
        stream,
        n: params.n(),
        best_of: params.best_of(),
        presence_penalty: params.presence_penalty(),
        frequency_penalty: params.frequency_penalty(),
        repetition_penalty: params.repetition_penalty(),
        temperature: params.temperature(),
        top_p: params.top_p(),
        top_k: params.top_k(),
        min_p: params.min_p(),
        use_beam_search: params.use_beam_search(),
        length_penalty: params.length_penalty(),
        early_stopping: params.early_stopping(),
        stop: StopField::from_slice(params.stop()),
        stop_token_ids: (!stop_token_ids.is_empty()).then_some(stop_token_ids),
        include_stop_str_in_output: params.include_stop_str_in_output(),
        ignore_eos: params.ignore_eos(),
        max_tokens: params.max_tokens(),
        logprobs: params.logprobs(),
        prompt_logprobs: params.prompt_logprobs(),
        skip_special_tokens: params.skip_special_tokens(),
        spaces_between_special_tokens: params.spaces_between_special_tokens(),
    };

    let Value::Object(mut body) = serde_json::to_value(&payload)? else {
        return Err(Error::Serialization(serde::ser::Error::custom(
            "request payload did not encode to a JSON object",
        )));
    };

    if let Some(extensions) = extensions {
        for (key, value) in extensions {
            body.insert(key.clone(), value.clone());
        }
    }

    // Not overridable by extensions.
    body.insert(
        "early_stopping".to_string(),
        params.early_stopping().to_wire(),
    );

    Ok(body)
}
