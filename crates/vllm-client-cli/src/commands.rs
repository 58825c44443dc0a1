//! CLI command implementations.

use std::io::{self, Write};

use color_eyre::eyre::{eyre, Result, WrapErr};
use futures::StreamExt;
use serde_json::Value;

use vllm_client::{
    CancellationToken, ClientConfig, Extensions, GenerationClient, GenerationFrame,
    GenerationRequest, SamplingParams,
};

use crate::SamplingArgs;

/// Loads the client configuration, letting `--url` override it.
pub fn load_config(url: Option<String>) -> Result<ClientConfig> {
    let mut config = ClientConfig::load()?;
    if let Some(url) = url {
        config.base_url = url;
    }
    Ok(config)
}

/// Builds sampling parameters from command-line options.
pub fn sampling_params(args: &SamplingArgs) -> Result<SamplingParams> {
    let mut builder = SamplingParams::builder()
        .n(args.n)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .top_p(args.top_p)
        .top_k(args.top_k)
        .repetition_penalty(args.repetition_penalty)
        .min_p(args.min_p)
        .presence_penalty(args.presence_penalty)
        .frequency_penalty(args.frequency_penalty)
        .use_beam_search(args.beam_search)
        .length_penalty(args.length_penalty)
        .early_stopping(args.early_stopping)
        .stops(args.stop.iter().cloned())
        .ignore_eos(args.ignore_eos)
        .skip_special_tokens(!args.keep_special_tokens);

    for &id in &args.stop_token_ids {
        builder = builder.stop_token_id(id);
    }
    if let Some(best_of) = args.best_of {
        builder = builder.best_of(best_of);
    }
    if let Some(logprobs) = args.logprobs {
        builder = builder.logprobs(logprobs);
    }
    if let Some(logprobs) = args.prompt_logprobs {
        builder = builder.prompt_logprobs(logprobs);
    }

    Ok(builder.build()?)
}

/// Parses `KEY=JSON` pairs; values that are not JSON are sent as strings.
pub fn parse_extensions(pairs: &[String]) -> Result<Extensions> {
    let mut extensions = Extensions::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| eyre!("extra field '{pair}' is not KEY=VALUE"))?;
        if key.is_empty() {
            return Err(eyre!("extra field '{pair}' has an empty key"));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        extensions.insert(key.to_string(), value);
    }
    Ok(extensions)
}

fn without_prompt<'a>(text: &'a str, prompt: &str, keep_prompt: bool) -> &'a str {
    if keep_prompt {
        text
    } else {
        text.strip_prefix(prompt).unwrap_or(text)
    }
}

/// Generate text from a prompt.
pub async fn generate(
    config: &ClientConfig,
    prompt: String,
    sampling: &SamplingArgs,
    extra: &[String],
    stream: bool,
    keep_prompt: bool,
) -> Result<()> {
    let params = sampling_params(sampling).wrap_err("invalid sampling options")?;
    let extensions = parse_extensions(extra)?;
    let client = GenerationClient::from_config(config)?;

    let request = GenerationRequest::new(prompt.clone(), params);
    let request = if extensions.is_empty() {
        request
    } else {
        request.with_extensions(extensions)
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupted, cancelling request");
                cancel.cancel();
            }
        });
    }

    if stream {
        let mut frames = client.stream_with(request, cancel).await?;
        let mut previous: Option<GenerationFrame> = None;
        let mut stdout = io::stdout();

        // Only the first completion is printed live.
        while let Some(frame) = frames.next().await {
            let frame = frame?;
            let delta = match &previous {
                Some(prev) => frame.delta_since(Some(prev)).first().copied().unwrap_or(""),
                None => frame
                    .get(0)
                    .map_or("", |text| without_prompt(text, &prompt, keep_prompt)),
            };
            write!(stdout, "{delta}")?;
            stdout.flush()?;
            previous = Some(frame);
        }
        writeln!(stdout)?;

        if let Some(last) = previous.filter(|frame| frame.len() > 1) {
            for (i, text) in last.iter().enumerate().skip(1) {
                println!("\n--- completion {} ---", i + 1);
                println!("{}", without_prompt(text, &prompt, keep_prompt));
            }
        }
    } else {
        let texts = match client.generate_with(request, &cancel).await {
            Err(vllm_client::Error::Cancelled) => return Ok(()),
            other => other?,
        };

        let many = texts.len() > 1;
        for (i, text) in texts.iter().enumerate() {
            if many {
                println!("--- completion {} ---", i + 1);
            }
            println!("{}", without_prompt(text, &prompt, keep_prompt));
        }
    }

    Ok(())
}

/// Prints the effective configuration and where it comes from.
pub fn show_config(config: &ClientConfig) -> Result<()> {
    let config_path = ClientConfig::config_path();

    println!("vLLM Client Configuration");
    println!("=========================\n");

    println!("Config file: {}", config_path.display());
    if config_path.exists() {
        println!("Status: Found\n");
    } else {
        println!("Status: Not found (using defaults)\n");
    }

    println!("Current settings:");
    println!("{}", toml::to_string_pretty(config)?);

    match config.endpoint() {
        Ok(endpoint) => println!("Endpoint: {endpoint}"),
        Err(e) => println!("Endpoint: invalid ({e})"),
    }

    println!("\nEnvironment variables:");
    for name in ["BASE_URL", "TIMEOUT_SECS", "CONNECT_TIMEOUT_SECS", "STREAM_BUFFER_CAPACITY"] {
        println!("  {}{name}", vllm_client::config::ENV_PREFIX);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use serde_json::json;

    use super::*;

    #[derive(Parser)]
    struct SamplingCli {
        #[command(flatten)]
        sampling: SamplingArgs,
    }

    fn parse_sampling(args: &[&str]) -> Result<SamplingParams> {
        let argv = std::iter::once("vllm-cli").chain(args.iter().copied());
        let cli = SamplingCli::try_parse_from(argv)?;
        sampling_params(&cli.sampling)
    }

    #[test]
    fn test_sampling_flags() {
        let params = parse_sampling(&[
            "--repetition-penalty",
            "1.2",
            "--min-p",
            "0.05",
            "--stop-token-id",
            "2",
            "--stop-token-id",
            "7",
            "--logprobs",
            "3",
            "--prompt-logprobs",
            "1",
            "--keep-special-tokens",
        ])
        .unwrap();

        assert!((params.repetition_penalty() - 1.2).abs() < 1e-9);
        assert!((params.min_p() - 0.05).abs() < 1e-9);
        assert_eq!(params.stop_token_ids(), &[2, 7]);
        assert_eq!(params.logprobs(), Some(3));
        assert_eq!(params.prompt_logprobs(), Some(1));
        assert!(!params.skip_special_tokens());
    }

    #[test]
    fn test_sampling_flag_defaults_match_library() {
        let params = parse_sampling(&[]).unwrap();
        assert_eq!(params, SamplingParams::default());
    }

    #[test]
    fn test_sampling_flags_are_validated() {
        assert!(parse_sampling(&["--repetition-penalty", "3"]).is_err());
        assert!(parse_sampling(&["--min-p", "1.5"]).is_err());
    }

    #[test]
    fn test_parse_extensions() {
        let extensions = parse_extensions(&[
            "max_tokens=3".to_string(),
            "model=\"llama\"".to_string(),
            "tag=plain text".to_string(),
        ])
        .unwrap();

        assert_eq!(extensions["max_tokens"], json!(3));
        assert_eq!(extensions["model"], json!("llama"));
        assert_eq!(extensions["tag"], json!("plain text"));
    }

    #[test]
    fn test_parse_extensions_rejects_malformed_pairs() {
        assert!(parse_extensions(&["no_equals".to_string()]).is_err());
        assert!(parse_extensions(&["=1".to_string()]).is_err());
    }

    #[test]
    fn test_without_prompt() {
        assert_eq!(without_prompt("Q: A", "Q: ", false), "A");
        assert_eq!(without_prompt("Q: A", "Q: ", true), "Q: A");
        assert_eq!(without_prompt("other", "Q: ", false), "other");
    }
}
