use std::collections::HashSet;
use std::time::Instant;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{Config, Llama, LlamaConfig, LlamaEosToks};
use eyre::{eyre, Context, Result};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use crate::chat::ChatTemplate;
use crate::device::DeviceKind;
use crate::hub::{ModelFiles, ModelSource};

/// End-of-turn markers used by ChatML-style models besides the configured eos.
const EOS_MARKERS: [&str; 2] = ["<|im_end|>", "<|endoftext|>"];

/// Weights, tokenizer and prompt template bound to one device.
pub struct Model {
    pub llama: Llama,
    pub config: Config,
    pub tokenizer: Tokenizer,
    pub template: ChatTemplate,
    pub device: Device,
    pub kind: DeviceKind,
    pub dtype: DType,
    pub eos: HashSet<u32>,
}

impl Model {
    /// Takes a while: downloads missing files and maps all weights.
    pub fn load(source: &ModelSource, kind: DeviceKind) -> Result<Self> {
        let start = Instant::now();

        let files = ModelFiles::resolve(source)
            .wrap_err_with(|| format!("failed to resolve model files for {source}"))?;

        debug!(
            weights = files.weights.len(),
            elapsed = ?start.elapsed(),
            "retrieved the model files"
        );

        let tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(|e| eyre!(e))?;

        let template = match &files.tokenizer_config {
            Some(path) => ChatTemplate::from_tokenizer_config(path)?,
            None => ChatTemplate::default(),
        };

        let config: LlamaConfig = {
            let raw = std::fs::read(&files.config)
                .wrap_err_with(|| format!("failed to read {}", files.config.display()))?;
            serde_json::from_slice(&raw).wrap_err("failed to deser model config")?
        };
        let config = config.into_config(false);

        let start = Instant::now();

        let device = kind
            .open()
            .wrap_err_with(|| format!("failed to open {kind} device"))?;
        let dtype = kind.dtype();

        let llama = {
            let vb = unsafe { VarBuilder::from_mmaped_safetensors(&files.weights, dtype, &device)? };

            Llama::load(vb, &config)?
        };

        let eos = eos_tokens(&config, &tokenizer);

        info!(
            model = %source,
            device = %kind,
            ?dtype,
            elapsed = ?start.elapsed(),
            "model loaded"
        );

        Ok(Self {
            llama,
            config,
            tokenizer,
            template,
            device,
            kind,
            dtype,
            eos,
        })
    }
}

fn eos_tokens(config: &Config, tokenizer: &Tokenizer) -> HashSet<u32> {
    let mut eos: HashSet<u32> = match &config.eos_token_id {
        Some(LlamaEosToks::Single(id)) => HashSet::from([*id]),
        Some(LlamaEosToks::Multiple(ids)) => ids.iter().copied().collect(),
        None => HashSet::new(),
    };

    for marker in EOS_MARKERS {
        if let Some(id) = tokenizer.token_to_id(marker) {
            eos.insert(id);
        }
    }

    eos
}
