use std::time::{Duration, Instant};

use candle_core::{DType, Tensor};
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::llama::Cache;
use eyre::{Error as E, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::chat::Message;
use crate::model::Model;
use crate::token_output_stream::TokenOutputStream;

/// Knobs for the sampling loop. Defaults reproduce the demo: greedy decoding,
/// 128 new tokens, completion only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_new_tokens: usize,
    pub return_full_text: bool,
    pub temperature: Option<f64>,
    pub top_k: Option<usize>,
    pub top_p: Option<f64>,
    pub seed: u64,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 128,
            return_full_text: false,
            temperature: None,
            top_k: None,
            top_p: None,
            seed: 299792458,
            repeat_penalty: 1.0,
            repeat_last_n: 64,
        }
    }
}

impl GenerationParams {
    pub fn sampling(&self) -> Sampling {
        let temperature = self.temperature.unwrap_or(0.);

        if temperature <= 0. {
            Sampling::ArgMax
        } else {
            match (self.top_k, self.top_p) {
                (None, None) => Sampling::All { temperature },
                (Some(k), None) => Sampling::TopK { k, temperature },
                (None, Some(p)) => Sampling::TopP { p, temperature },
                (Some(k), Some(p)) => Sampling::TopKThenTopP { k, p, temperature },
            }
        }
    }
}

/// One result record, shaped like a text-generation pipeline output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generated {
    pub generated_text: String,
}

/// Something that maps a conversation to generated text.
///
/// Implementations are shared between threads and must not need `&mut self`.
pub trait Generate: Send + Sync {
    fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<Vec<Generated>>;
}

#[derive(Debug)]
pub struct Completion {
    pub text: String,
    pub prompt_tokens: usize,
    pub generated_tokens: usize,
    pub elapsed: Duration,
}

/// Autoregressive sampling over a loaded [`Model`], with its own KV cache.
pub struct TextGenerator<'m> {
    model: &'m Model,
    cache: Cache,
    logits_processor: LogitsProcessor,
    repeat_penalty: f32,
    repeat_last_n: usize,
}

impl<'m> TextGenerator<'m> {
    pub fn new(model: &'m Model, params: &GenerationParams) -> Result<Self> {
        let cache = Cache::new(true, model.dtype, &model.config, &model.device)?;

        Ok(Self {
            model,
            cache,
            logits_processor: LogitsProcessor::from_sampling(params.seed, params.sampling()),
            repeat_penalty: params.repeat_penalty,
            repeat_last_n: params.repeat_last_n,
        })
    }

    pub fn run(&mut self, prompt: &str, max_new_tokens: usize) -> Result<Completion> {
        let mut tokens = self
            .model
            .tokenizer
            .encode(prompt, false)
            .map_err(E::msg)?
            .get_ids()
            .to_vec();

        let prompt_tokens = tokens.len();
        let limit = self.model.config.max_position_embeddings;

        if prompt_tokens + max_new_tokens > limit {
            eyre::bail!(
                "prompt of {prompt_tokens} tokens plus {max_new_tokens} new tokens exceeds the context of {limit}"
            );
        }

        let mut stream = TokenOutputStream::new(&self.model.tokenizer);
        let start_gen = Instant::now();
        let mut index_pos = 0;

        for index in 0..max_new_tokens {
            let context_size = if index > 0 { 1 } else { tokens.len() };
            let start_pos = tokens.len().saturating_sub(context_size);
            let ctxt = &tokens[start_pos..];
            let input = Tensor::new(ctxt, &self.model.device)?.unsqueeze(0)?;

            let logits = self.model.llama.forward(&input, index_pos, &mut self.cache)?;
            let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
            let logits = if self.repeat_penalty == 1. {
                logits
            } else {
                let start_at = tokens.len().saturating_sub(self.repeat_last_n);

                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    self.repeat_penalty,
                    &tokens[start_at..],
                )?
            };
            index_pos += ctxt.len();

            let next_token = self.logits_processor.sample(&logits)?;
            tokens.push(next_token);

            if self.model.eos.contains(&next_token) {
                break;
            }

            if let Some(piece) = stream.next_token(next_token)? {
                trace!(piece = %piece, "token");
            }
        }

        if let Some(rest) = stream.decode_rest()? {
            trace!(piece = %rest, "token");
        }

        Ok(Completion {
            text: stream.decode_all()?,
            prompt_tokens,
            generated_tokens: stream.len(),
            elapsed: start_gen.elapsed(),
        })
    }
}

/// The loaded model behind the [`Generate`] seam.
pub struct Pipeline {
    model: Model,
}

impl Pipeline {
    pub fn new(model: Model) -> Self {
        Self { model }
    }
}

impl Generate for Pipeline {
    fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<Vec<Generated>> {
        let prompt = self.model.template.apply(messages)?;

        let completion = TextGenerator::new(&self.model, params)?.run(&prompt, params.max_new_tokens)?;

        debug!(
            prompt_tokens = completion.prompt_tokens,
            generated_tokens = completion.generated_tokens,
            elapsed = ?completion.elapsed,
            tokens_per_sec = completion.generated_tokens as f64 / completion.elapsed.as_secs_f64(),
            "generation finished"
        );

        let generated_text = if params.return_full_text {
            prompt + &completion.text
        } else {
            completion.text
        };

        Ok(vec![Generated { generated_text }])
    }
}
