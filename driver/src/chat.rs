use std::path::Path;

use eyre::{eyre, Context, Result};
use minijinja::{context, Environment, Error, ErrorKind};
use serde::{Deserialize, Serialize};

/// ChatML, as used by the SmolLM2 family when the tokenizer config carries no
/// template of its own.
const CHATML: &str = "{% for message in messages %}\
{% if loop.first and messages[0]['role'] != 'system' %}\
{{ '<|im_start|>system\nYou are a helpful AI assistant named SmolLM, trained by Hugging Face<|im_end|>\n' }}\
{% endif %}\
{{ '<|im_start|>' + message['role'] + '\n' + message['content'] + '<|im_end|>' + '\n' }}\
{% endfor %}\
{% if add_generation_prompt %}{{ '<|im_start|>assistant\n' }}{% endif %}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenizerConfig {
    chat_template: Option<String>,
    bos_token: Option<SpecialToken>,
    eos_token: Option<SpecialToken>,
}

/// Special tokens show up either as plain strings or as `AddedToken` objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpecialToken {
    Plain(String),
    Added { content: String },
}

impl SpecialToken {
    fn into_content(self) -> String {
        match self {
            Self::Plain(s) | Self::Added { content: s } => s,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatTemplate {
    source: String,
    bos_token: String,
    eos_token: String,
}

impl Default for ChatTemplate {
    fn default() -> Self {
        Self {
            source: CHATML.to_string(),
            bos_token: "<|im_start|>".to_string(),
            eos_token: "<|im_end|>".to_string(),
        }
    }
}

impl ChatTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Reads `chat_template` from a `tokenizer_config.json`, keeping ChatML
    /// for anything the file does not provide.
    pub fn from_tokenizer_config(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let config: TokenizerConfig =
            serde_json::from_slice(&raw).wrap_err("failed to deser tokenizer config")?;

        let mut template = Self::default();

        if let Some(source) = config.chat_template {
            template.source = source;
        }
        if let Some(bos) = config.bos_token {
            template.bos_token = bos.into_content();
        }
        if let Some(eos) = config.eos_token {
            template.eos_token = eos.into_content();
        }

        Ok(template)
    }

    /// Render the conversation followed by the assistant generation prompt.
    pub fn apply(&self, messages: &[Message]) -> Result<String> {
        let mut env = Environment::new();
        env.add_function("raise_exception", raise_exception);

        env.render_str(
            &self.source,
            context! {
                messages => messages,
                add_generation_prompt => true,
                bos_token => &self.bos_token,
                eos_token => &self.eos_token,
            },
        )
        .map_err(|e| eyre!("failed to render chat template: {e:#}"))
    }
}

fn raise_exception(msg: String) -> Result<String, Error> {
    Err(Error::new(ErrorKind::InvalidOperation, msg))
}
