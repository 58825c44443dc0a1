//! Sampling parameters for text generation.
//!
//! [`SamplingParams`] is validated exactly once, when
//! [`SamplingParamsBuilder::build`] runs. A value that fails validation is
//! never handed out, and a finished value cannot be mutated, so every
//! `SamplingParams` in circulation satisfies the checks below.
//!
//! Validation happens in two stages. Universal range checks run first.
//! Mode checks follow, where the mode is inferred from the fields:
//!
//! | mode | selected by | requires |
//! |---|---|---|
//! | beam search | `use_beam_search` | effective `best_of > 1`, `temperature ≈ 0` |
//! | standard | `!use_beam_search` | `early_stopping == Heuristic`, `length_penalty ≈ 1` |
//! | greedy | standard with `temperature ≈ 0` | effective `best_of ≤ 1`, `top_p ≈ 1`, `top_k == -1` |

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

/// Tolerance used for float comparisons against 0 and 1.
pub const EPS: f64 = 1e-5;

/// Value of `top_k` that disables top-k filtering.
pub const TOP_K_DISABLED: i32 = -1;

/// Stopping condition for beam search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EarlyStopping {
    /// Stop using the server's heuristic. Encoded as `false`.
    #[default]
    Heuristic,
    /// Stop as soon as `best_of` complete candidates exist. Encoded as `true`.
    BestOf,
    /// Run until no better candidate can be found. Encoded as `"never"`.
    Never,
}

impl EarlyStopping {
    /// Returns the literal wire value for this mode.
    #[must_use]
    pub fn to_wire(self) -> serde_json::Value {
        match self {
            Self::Heuristic => serde_json::Value::Bool(false),
            Self::BestOf => serde_json::Value::Bool(true),
            Self::Never => serde_json::Value::String("never".to_string()),
        }
    }
}

impl Serialize for EarlyStopping {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_wire().serialize(serializer)
    }
}

impl fmt::Display for EarlyStopping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heuristic => write!(f, "heuristic"),
            Self::BestOf => write!(f, "best_of"),
            Self::Never => write!(f, "never"),
        }
    }
}

impl FromStr for EarlyStopping {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "heuristic" | "false" => Ok(Self::Heuristic),
            "best_of" | "best-of" | "true" => Ok(Self::BestOf),
            "never" => Ok(Self::Never),
            other => Err(Error::validation(
                "early_stopping",
                format!("unknown mode '{other}', expected heuristic, best_of or never"),
            )),
        }
    }
}

/// Sampling mode inferred from the other parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// Beam search over `best_of` beams.
    BeamSearch,
    /// Random sampling.
    Standard,
    /// Argmax decoding (standard mode with zero temperature).
    Greedy,
}

/// Parameters controlling how the server samples text.
///
/// Build with [`SamplingParams::builder`]; the default value is valid.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
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
    stop: Vec<String>,
    stop_token_ids: Vec<u32>,
    include_stop_str_in_output: bool,
    ignore_eos: bool,
    max_tokens: u32,
    logprobs: Option<u32>,
    prompt_logprobs: Option<u32>,
    skip_special_tokens: bool,
    spaces_between_special_tokens: bool,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            n: 1,
            best_of: None,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            repetition_penalty: 1.0,
            temperature: 1.0,
            top_p: 1.0,
            top_k: TOP_K_DISABLED,
            min_p: 0.0,
            use_beam_search: false,
            length_penalty: 1.0,
            early_stopping: EarlyStopping::Heuristic,
            stop: Vec::new(),
            stop_token_ids: Vec::new(),
            include_stop_str_in_output: false,
            ignore_eos: false,
            max_tokens: 16,
            logprobs: None,
            prompt_logprobs: None,
            skip_special_tokens: true,
            spaces_between_special_tokens: true,
        }
    }
}

impl SamplingParams {
    /// Starts a builder from the default parameters.
    #[must_use]
    pub fn builder() -> SamplingParamsBuilder {
        SamplingParamsBuilder::default()
    }

    /// Starts a builder from a copy of these parameters.
    #[must_use]
    pub fn to_builder(&self) -> SamplingParamsBuilder {
        SamplingParamsBuilder {
            params: self.clone(),
        }
    }

    /// Creates greedy sampling parameters (temperature = 0).
    #[must_use]
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            ..Self::default()
        }
    }

    /// Creates beam search parameters with the given beam width.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `width` is less than 2.
    pub fn beam_search(width: u32) -> Result<Self> {
        Self::builder()
            .best_of(width)
            .use_beam_search(true)
            .temperature(0.0)
            .build()
    }

    /// Returns the mode these parameters select.
    #[must_use]
    pub fn mode(&self) -> SamplingMode {
        if self.use_beam_search {
            SamplingMode::BeamSearch
        } else if self.temperature < EPS {
            SamplingMode::Greedy
        } else {
            SamplingMode::Standard
        }
    }

    /// Number of candidates the server generates: `best_of`, or `n` if unset.
    #[must_use]
    pub fn effective_best_of(&self) -> u32 {
        self.best_of.unwrap_or(self.n)
    }

    /// Number of completions returned.
    #[must_use]
    pub fn n(&self) -> u32 {
        self.n
    }

    /// Number of candidates generated, if set explicitly.
    #[must_use]
    pub fn best_of(&self) -> Option<u32> {
        self.best_of
    }

    /// Presence penalty.
    #[must_use]
    pub fn presence_penalty(&self) -> f64 {
        self.presence_penalty
    }

    /// Frequency penalty.
    #[must_use]
    pub fn frequency_penalty(&self) -> f64 {
        self.frequency_penalty
    }

    /// Repetition penalty.
    #[must_use]
    pub fn repetition_penalty(&self) -> f64 {
        self.repetition_penalty
    }

    /// Sampling temperature.
    #[must_use]
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Nucleus sampling threshold.
    #[must_use]
    pub fn top_p(&self) -> f64 {
        self.top_p
    }

    /// Top-k cutoff, [`TOP_K_DISABLED`] when off.
    #[must_use]
    pub fn top_k(&self) -> i32 {
        self.top_k
    }

    /// Minimum relative token probability.
    #[must_use]
    pub fn min_p(&self) -> f64 {
        self.min_p
    }

    /// Whether beam search is used.
    #[must_use]
    pub fn use_beam_search(&self) -> bool {
        self.use_beam_search
    }

    /// Beam search length penalty.
    #[must_use]
    pub fn length_penalty(&self) -> f64 {
        self.length_penalty
    }

    /// Beam search stopping condition.
    #[must_use]
    pub fn early_stopping(&self) -> EarlyStopping {
        self.early_stopping
    }

    /// Stop strings.
    #[must_use]
    pub fn stop(&self) -> &[String] {
        &self.stop
    }

    /// Stop token ids.
    #[must_use]
    pub fn stop_token_ids(&self) -> &[u32] {
        &self.stop_token_ids
    }

    /// Whether stop strings are kept in the output.
    #[must_use]
    pub fn include_stop_str_in_output(&self) -> bool {
        self.include_stop_str_in_output
    }

    /// Whether the end-of-sequence token is ignored.
    #[must_use]
    pub fn ignore_eos(&self) -> bool {
        self.ignore_eos
    }

    /// Maximum number of generated tokens per completion.
    #[must_use]
    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Number of log probabilities returned per generated token.
    #[must_use]
    pub fn logprobs(&self) -> Option<u32> {
        self.logprobs
    }

    /// Number of log probabilities returned per prompt token.
    #[must_use]
    pub fn prompt_logprobs(&self) -> Option<u32> {
        self.prompt_logprobs
    }

    /// Whether special tokens are removed from the output.
    #[must_use]
    pub fn skip_special_tokens(&self) -> bool {
        self.skip_special_tokens
    }

    /// Whether special tokens are separated by spaces in the output.
    #[must_use]
    pub fn spaces_between_special_tokens(&self) -> bool {
        self.spaces_between_special_tokens
    }

    fn validate(&self) -> Result<()> {
        self.validate_universal()?;
        match self.mode() {
            SamplingMode::BeamSearch => self.validate_beam_search(),
            SamplingMode::Standard => self.validate_non_beam_search(),
            SamplingMode::Greedy => {
                self.validate_non_beam_search()?;
                self.validate_greedy()
            }
        }
    }

    fn validate_universal(&self) -> Result<()> {
        if self.n < 1 {
            return Err(Error::validation("n", format!("must be at least 1, got {}", self.n)));
        }
        if let Some(best_of) = self.best_of {
            if best_of < self.n {
                return Err(Error::validation(
                    "best_of",
                    format!("must be greater than or equal to n ({}), got {best_of}", self.n),
                ));
            }
        }
        if !(-2.0..=2.0).contains(&self.presence_penalty) {
            return Err(Error::validation(
                "presence_penalty",
                format!("must be in [-2, 2], got {}", self.presence_penalty),
            ));
        }
        if !(-2.0..=2.0).contains(&self.frequency_penalty) {
            return Err(Error::validation(
                "frequency_penalty",
                format!("must be in [-2, 2], got {}", self.frequency_penalty),
            ));
        }
        if !(self.repetition_penalty > 0.0 && self.repetition_penalty <= 2.0) {
            return Err(Error::validation(
                "repetition_penalty",
                format!("must be in (0, 2], got {}", self.repetition_penalty),
            ));
        }
        if !(self.temperature >= 0.0 && self.temperature.is_finite()) {
            return Err(Error::validation(
                "temperature",
                format!("must be non-negative, got {}", self.temperature),
            ));
        }
        if !self.length_penalty.is_finite() {
            return Err(Error::validation(
                "length_penalty",
                format!("must be finite, got {}", self.length_penalty),
            ));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(Error::validation(
                "top_p",
                format!("must be in (0, 1], got {}", self.top_p),
            ));
        }
        if self.top_k != TOP_K_DISABLED && self.top_k < 1 {
            return Err(Error::validation(
                "top_k",
                format!("must be -1 (disable) or at least 1, got {}", self.top_k),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_p) {
            return Err(Error::validation(
                "min_p",
                format!("must be in [0, 1], got {}", self.min_p),
            ));
        }
        if self.max_tokens < 1 {
            return Err(Error::validation(
                "max_tokens",
                format!("must be at least 1, got {}", self.max_tokens),
            ));
        }
        Ok(())
    }

    fn validate_beam_search(&self) -> Result<()> {
        let best_of = self.effective_best_of();
        if best_of <= 1 {
            return Err(Error::validation(
                "best_of",
                format!("must be greater than 1 when using beam search, got {best_of}"),
            ));
        }
        if self.temperature > EPS {
            return Err(Error::validation(
                "temperature",
                format!("must be 0 when using beam search, got {}", self.temperature),
            ));
        }
        Ok(())
    }

    fn validate_non_beam_search(&self) -> Result<()> {
        if self.early_stopping != EarlyStopping::Heuristic {
            return Err(Error::validation(
                "early_stopping",
                format!(
                    "is only meaningful with beam search; must be heuristic, got {}",
                    self.early_stopping
                ),
            ));
        }
        if (self.length_penalty - 1.0).abs() > EPS || self.length_penalty.is_nan() {
            return Err(Error::validation(
                "length_penalty",
                format!(
                    "is only meaningful with beam search; must be 1, got {}",
                    self.length_penalty
                ),
            ));
        }
        Ok(())
    }

    fn validate_greedy(&self) -> Result<()> {
        let best_of = self.effective_best_of();
        if best_of > 1 {
            return Err(Error::validation(
                "best_of",
                format!("must be 1 when using greedy sampling, got {best_of}"),
            ));
        }
        if self.top_p < 1.0 - EPS {
            return Err(Error::validation(
                "top_p",
                format!("must be 1 when using greedy sampling, got {}", self.top_p),
            ));
        }
        if self.top_k != TOP_K_DISABLED {
            return Err(Error::validation(
                "top_k",
                format!("must be -1 when using greedy sampling, got {}", self.top_k),
            ));
        }
        Ok(())
    }
}

/// Builder for [`SamplingParams`].
#[derive(Debug, Clone, Default)]
pub struct SamplingParamsBuilder {
    params: SamplingParams,
}

impl SamplingParamsBuilder {
    /// Sets the number of completions.
    #[must_use]
    pub fn n(mut self, n: u32) -> Self {
        self.params.n = n;
        self
    }

    /// Sets the number of generated candidates.
    #[must_use]
    pub fn best_of(mut self, best_of: u32) -> Self {
        self.params.best_of = Some(best_of);
        self
    }

    /// Sets the presence penalty.
    #[must_use]
    pub fn presence_penalty(mut self, penalty: f64) -> Self {
        self.params.presence_penalty = penalty;
        self
    }

    /// Sets the frequency penalty.
    #[must_use]
    pub fn frequency_penalty(mut self, penalty: f64) -> Self {
        self.params.frequency_penalty = penalty;
        self
    }

    /// Sets the repetition penalty.
    #[must_use]
    pub fn repetition_penalty(mut self, penalty: f64) -> Self {
        self.params.repetition_penalty = penalty;
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.params.temperature = temperature;
        self
    }

    /// Sets the top-p value.
    #[must_use]
    pub fn top_p(mut self, top_p: f64) -> Self {
        self.params.top_p = top_p;
        self
    }

    /// Sets the top-k value.
    #[must_use]
    pub fn top_k(mut self, top_k: i32) -> Self {
        self.params.top_k = top_k;
        self
    }

    /// Sets the min-p value.
    #[must_use]
    pub fn min_p(mut self, min_p: f64) -> Self {
        self.params.min_p = min_p;
        self
    }

    /// Enables or disables beam search.
    #[must_use]
    pub fn use_beam_search(mut self, enabled: bool) -> Self {
        self.params.use_beam_search = enabled;
        self
    }

    /// Sets the beam search length penalty.
    #[must_use]
    pub fn length_penalty(mut self, penalty: f64) -> Self {
        self.params.length_penalty = penalty;
        self
    }

    /// Sets the beam search stopping condition.
    #[must_use]
    pub fn early_stopping(mut self, mode: EarlyStopping) -> Self {
        self.params.early_stopping = mode;
        self
    }

    /// Adds a stop string.
    #[must_use]
    pub fn stop(mut self, stop: impl Into<String>) -> Self {
        self.params.stop.push(stop.into());
        self
    }

    /// Replaces all stop strings.
    #[must_use]
    pub fn stops<I, S>(mut self, stops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.params.stop = stops.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a stop token id.
    #[must_use]
    pub fn stop_token_id(mut self, id: u32) -> Self {
        self.params.stop_token_ids.push(id);
        self
    }

    /// Keeps matched stop strings in the output.
    #[must_use]
    pub fn include_stop_str_in_output(mut self, include: bool) -> Self {
        self.params.include_stop_str_in_output = include;
        self
    }

    /// Keeps generating past the end-of-sequence token.
    #[must_use]
    pub fn ignore_eos(mut self, ignore: bool) -> Self {
        self.params.ignore_eos = ignore;
        self
    }

    /// Sets the maximum tokens.
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.params.max_tokens = max_tokens;
        self
    }

    /// Requests log probabilities for generated tokens.
    #[must_use]
    pub fn logprobs(mut self, logprobs: u32) -> Self {
        self.params.logprobs = Some(logprobs);
        self
    }

    /// Requests log probabilities for prompt tokens.
    #[must_use]
    pub fn prompt_logprobs(mut self, logprobs: u32) -> Self {
        self.params.prompt_logprobs = Some(logprobs);
        self
    }

    /// Sets whether special tokens are removed from the output.
    #[must_use]
    pub fn skip_special_tokens(mut self, skip: bool) -> Self {
        self.params.skip_special_tokens = skip;
        self
    }

    /// Sets whether special tokens are separated by spaces.
    #[must_use]
    pub fn spaces_between_special_tokens(mut self, spaces: bool) -> Self {
        self.params.spaces_between_special_tokens = spaces;
        self
    }

    /// Validates and returns the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] naming the first violated constraint.
    pub fn build(self) -> Result<SamplingParams> {
        self.params.validate()?;
        Ok(self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violated(result: Result<SamplingParams>) -> &'static str {
        match result {
            Err(Error::Validation { parameter, .. }) => parameter,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_is_valid() {
        let params = SamplingParams::builder().build().unwrap();
        assert_eq!(params, SamplingParams::default());
        assert_eq!(params.n(), 1);
        assert_eq!(params.max_tokens(), 16);
        assert_eq!(params.top_k(), TOP_K_DISABLED);
        assert!(params.skip_special_tokens());
        assert_eq!(params.mode(), SamplingMode::Standard);
    }

    #[test]
    fn test_presets() {
        assert_eq!(SamplingParams::greedy().mode(), SamplingMode::Greedy);
        assert!(SamplingParams::greedy().to_builder().build().is_ok());

        let beam = SamplingParams::beam_search(4).unwrap();
        assert_eq!(beam.mode(), SamplingMode::BeamSearch);
        assert_eq!(beam.best_of(), Some(4));

        assert_eq!(violated(SamplingParams::beam_search(1)), "best_of");
    }

    #[test]
    fn test_universal_constraints() {
        assert_eq!(violated(SamplingParams::builder().n(0).build()), "n");
        assert_eq!(violated(SamplingParams::builder().n(3).best_of(2).build()), "best_of");
        assert_eq!(
            violated(SamplingParams::builder().presence_penalty(3.0).build()),
            "presence_penalty"
        );
        assert_eq!(
            violated(SamplingParams::builder().frequency_penalty(-2.5).build()),
            "frequency_penalty"
        );
        assert_eq!(
            violated(SamplingParams::builder().repetition_penalty(0.0).build()),
            "repetition_penalty"
        );
        assert_eq!(
            violated(SamplingParams::builder().temperature(-0.1).build()),
            "temperature"
        );
        assert_eq!(violated(SamplingParams::builder().top_p(0.0).build()), "top_p");
        assert_eq!(violated(SamplingParams::builder().top_p(1.5).build()), "top_p");
        assert_eq!(violated(SamplingParams::builder().top_k(0).build()), "top_k");
        assert_eq!(violated(SamplingParams::builder().min_p(1.5).build()), "min_p");
        assert_eq!(violated(SamplingParams::builder().max_tokens(0).build()), "max_tokens");
    }

    #[test]
    fn test_nan_is_rejected() {
        assert_eq!(
            violated(SamplingParams::builder().temperature(f64::NAN).build()),
            "temperature"
        );
        assert_eq!(violated(SamplingParams::builder().top_p(f64::NAN).build()), "top_p");
        assert_eq!(
            violated(SamplingParams::builder().length_penalty(f64::NAN).build()),
            "length_penalty"
        );

        // Beam search accepts any length penalty, but never a non-finite one.
        for penalty in [f64::NAN, f64::INFINITY] {
            let result = SamplingParams::builder()
                .use_beam_search(true)
                .best_of(2)
                .temperature(0.0)
                .length_penalty(penalty)
                .build();
            assert_eq!(violated(result), "length_penalty");
        }
    }

    #[test]
    fn test_universal_checks_run_before_mode_checks() {
        // Both n and the beam search best_of rule are violated; n wins.
        let result = SamplingParams::builder()
            .n(0)
            .use_beam_search(true)
            .temperature(0.5)
            .build();
        assert_eq!(violated(result), "n");
    }

    #[test]
    fn test_beam_search_constraints() {
        let result = SamplingParams::builder()
            .use_beam_search(true)
            .best_of(1)
            .temperature(0.0)
            .build();
        assert_eq!(violated(result), "best_of");

        let result = SamplingParams::builder()
            .use_beam_search(true)
            .best_of(4)
            .temperature(0.5)
            .build();
        assert_eq!(violated(result), "temperature");

        // best_of falls back to n
        let params = SamplingParams::builder()
            .n(2)
            .use_beam_search(true)
            .temperature(0.0)
            .length_penalty(1.3)
            .early_stopping(EarlyStopping::Never)
            .build()
            .unwrap();
        assert_eq!(params.effective_best_of(), 2);
        assert_eq!(params.early_stopping(), EarlyStopping::Never);
    }

    #[test]
    fn test_standard_mode_rejects_beam_only_fields() {
        assert_eq!(
            violated(SamplingParams::builder().length_penalty(1.5).build()),
            "length_penalty"
        );
        assert_eq!(
            violated(
                SamplingParams::builder()
                    .early_stopping(EarlyStopping::BestOf)
                    .build()
            ),
            "early_stopping"
        );
        // Within tolerance is accepted.
        assert!(SamplingParams::builder().length_penalty(1.000_001).build().is_ok());
    }

    #[test]
    fn test_greedy_constraints() {
        let greedy = || SamplingParams::builder().temperature(0.0);

        assert_eq!(violated(greedy().top_p(0.9).build()), "top_p");
        assert_eq!(violated(greedy().top_k(40).build()), "top_k");
        assert_eq!(violated(greedy().n(2).build()), "best_of");
        assert_eq!(violated(greedy().best_of(3).build()), "best_of");

        // The same shapes are fine once temperature is non-zero.
        assert!(SamplingParams::builder()
            .temperature(0.7)
            .top_p(0.9)
            .top_k(40)
            .n(2)
            .build()
            .is_ok());
    }

    #[test]
    fn test_to_builder_revalidates() {
        let params = SamplingParams::builder().temperature(0.7).build().unwrap();
        assert!(params.to_builder().length_penalty(2.0).build().is_err());
        assert_eq!(params.to_builder().build().unwrap(), params);
    }

    #[test]
    fn test_early_stopping_wire_values() {
        assert_eq!(EarlyStopping::Heuristic.to_wire(), serde_json::json!(false));
        assert_eq!(EarlyStopping::BestOf.to_wire(), serde_json::json!(true));
        assert_eq!(EarlyStopping::Never.to_wire(), serde_json::json!("never"));

        for mode in [EarlyStopping::Heuristic, EarlyStopping::BestOf, EarlyStopping::Never] {
            assert_eq!(serde_json::to_value(mode).unwrap(), mode.to_wire());
        }
    }

    #[test]
    fn test_early_stopping_parse() {
        assert_eq!("never".parse::<EarlyStopping>().unwrap(), EarlyStopping::Never);
        assert_eq!("TRUE".parse::<EarlyStopping>().unwrap(), EarlyStopping::BestOf);
        assert_eq!("heuristic".parse::<EarlyStopping>().unwrap(), EarlyStopping::Heuristic);
        assert!("sometimes".parse::<EarlyStopping>().is_err());
    }
}
