//! # vLLM Client CLI
//!
//! Command-line front end for the vLLM generate API.

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::Result;

use vllm_client::EarlyStopping;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "vllm-cli")]
#[command(version)]
#[command(about = "Client for the vLLM generate API", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    json_logs: bool,

    /// Server base URL (overrides config file and VLLM_CLIENT_BASE_URL)
    #[arg(short, long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate completions for a prompt
    Generate {
        /// The prompt to generate from
        prompt: String,

        /// Stream output as it is generated
        #[arg(short, long)]
        stream: bool,

        /// Print completions with the echoed prompt still attached
        #[arg(long)]
        keep_prompt: bool,

        /// Extra request field as KEY=JSON (repeatable)
        #[arg(short = 'x', long = "extra", value_name = "KEY=JSON")]
        extra: Vec<String>,

        #[command(flatten)]
        sampling: SamplingArgs,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show config file path
    Path,
}

/// Sampling options; unset options keep the library defaults.
#[derive(Args, Debug)]
pub struct SamplingArgs {
    /// Number of completions
    #[arg(short, long, default_value = "1")]
    pub n: u32,

    /// Number of candidates to generate
    #[arg(long)]
    pub best_of: Option<u32>,

    /// Maximum tokens per completion
    #[arg(short = 'm', long, default_value = "16")]
    pub max_tokens: u32,

    /// Temperature for sampling
    #[arg(short, long, default_value = "1.0")]
    pub temperature: f64,

    /// Nucleus sampling threshold
    #[arg(long, default_value = "1.0")]
    pub top_p: f64,

    /// Top-k cutoff (-1 disables)
    #[arg(long, default_value = "-1", allow_hyphen_values = true)]
    pub top_k: i32,

    /// Repetition penalty
    #[arg(long, default_value = "1.0")]
    pub repetition_penalty: f64,

    /// Minimum token probability relative to the most likely token
    #[arg(long, default_value = "0.0")]
    pub min_p: f64,

    /// Presence penalty
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    pub presence_penalty: f64,

    /// Frequency penalty
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    pub frequency_penalty: f64,

    /// Use beam search
    #[arg(long)]
    pub beam_search: bool,

    /// Beam search length penalty
    #[arg(long, default_value = "1.0")]
    pub length_penalty: f64,

    /// Beam search stopping condition (heuristic, best_of, never)
    #[arg(long, default_value = "heuristic")]
    pub early_stopping: EarlyStopping,

    /// Stop string (repeatable)
    #[arg(long)]
    pub stop: Vec<String>,

    /// Stop token id (repeatable)
    #[arg(long = "stop-token-id", value_name = "ID")]
    pub stop_token_ids: Vec<u32>,

    /// Keep generating past the end-of-sequence token
    #[arg(long)]
    pub ignore_eos: bool,

    /// Number of log probabilities to return per output token
    #[arg(long)]
    pub logprobs: Option<u32>,

    /// Number of log probabilities to return per prompt token
    #[arg(long)]
    pub prompt_logprobs: Option<u32>,

    /// Keep special tokens in the output
    #[arg(long)]
    pub keep_special_tokens: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let logging_config = logging::LoggingConfig::new("vllm-client")
        .with_log_level(&cli.log_level)
        .with_json_logs(cli.json_logs);
    logging::init_logging(&logging_config);

    match cli.command {
        Commands::Generate {
            prompt,
            stream,
            keep_prompt,
            extra,
            sampling,
        } => {
            let config = commands::load_config(cli.url)?;
            commands::generate(&config, prompt, &sampling, &extra, stream, keep_prompt).await?;
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = commands::load_config(cli.url)?;
                commands::show_config(&config)?;
            }
            ConfigAction::Path => {
                println!("{}", vllm_client::ClientConfig::config_path().display());
            }
        },
    }

    Ok(())
}
