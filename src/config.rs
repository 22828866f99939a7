use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser};
use nl2sql_driver::hub::{DEFAULT_MODEL, DEFAULT_REVISION};
use nl2sql_driver::{GenerationParams, ModelSource};

/// Which model to run and how to sample from it.
#[derive(Debug, Clone, Args)]
pub struct ModelArgs {
    /// Hugging Face repo id, or a local directory holding the model files
    #[arg(long, env = "NL2SQL_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    #[arg(long, env = "NL2SQL_REVISION", default_value = DEFAULT_REVISION)]
    pub revision: String,

    /// Run on the CPU even when an accelerator is available
    #[arg(long, env = "NL2SQL_CPU")]
    pub cpu: bool,

    #[arg(long, default_value_t = 128)]
    pub max_new_tokens: usize,

    /// Sampling temperature; greedy decoding when unset or zero
    #[arg(long)]
    pub temperature: Option<f64>,

    #[arg(long)]
    pub top_k: Option<usize>,

    #[arg(long)]
    pub top_p: Option<f64>,

    #[arg(long, default_value_t = 299792458)]
    pub seed: u64,

    /// Penalty for repeating tokens, 1.0 disables it
    #[arg(long, default_value_t = 1.0)]
    pub repeat_penalty: f32,

    /// How many trailing tokens the repeat penalty looks at
    #[arg(long, default_value_t = 64)]
    pub repeat_last_n: usize,
}

impl ModelArgs {
    pub fn source(&self) -> ModelSource {
        ModelSource::parse(&self.model, &self.revision)
    }

    pub fn params(&self) -> GenerationParams {
        GenerationParams {
            max_new_tokens: self.max_new_tokens,
            return_full_text: false,
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            seed: self.seed,
            repeat_penalty: self.repeat_penalty,
            repeat_last_n: self.repeat_last_n,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct TelemetryArgs {
    /// More output per occurrence (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write a Chrome trace (chrome://tracing) to this file
    #[arg(long, env = "NL2SQL_TRACE_CHROME")]
    pub trace_chrome: Option<PathBuf>,
}

/// NL2SQL demo server
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct ServeArgs {
    #[arg(long, env = "NL2SQL_BIND", default_value = "127.0.0.1:8501")]
    pub bind: SocketAddr,

    /// Inference threads
    #[arg(long, env = "NL2SQL_WORKERS", default_value_t = 1)]
    pub workers: usize,

    /// Prompts that may wait for a free inference thread
    #[arg(long, env = "NL2SQL_QUEUE", default_value_t = 2)]
    pub queue: usize,

    /// Seconds of inactivity after which a browser session ends
    #[arg(long, env = "NL2SQL_SESSION_TTL", default_value_t = 3600)]
    pub session_ttl: u64,

    /// Load the model on the first request instead of at startup
    #[arg(long)]
    pub lazy: bool,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub telemetry: TelemetryArgs,
}

impl ServeArgs {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl)
    }
}

/// Translate one question to SQL and print it
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct AskArgs {
    /// The question; a random example is used when omitted
    pub question: Option<String>,

    /// Print the model output as-is instead of formatting it
    #[arg(long)]
    pub raw: bool,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub telemetry: TelemetryArgs,
}
