use eyre::Result;
use tokenizers::Tokenizer;

/// Incremental detokenizer: turns sampled ids into text pieces as soon as they
/// form complete words, so partial multi-byte sequences never leak out.
pub struct TokenOutputStream<'t> {
    tokenizer: &'t Tokenizer,
    tokens: Vec<u32>,
    prev_index: usize,
    current_index: usize,
}

impl<'t> TokenOutputStream<'t> {
    pub fn new(tokenizer: &'t Tokenizer) -> Self {
        Self {
            tokenizer,
            tokens: Vec::new(),
            prev_index: 0,
            current_index: 0,
        }
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        match self.tokenizer.decode(tokens, true) {
            Ok(str) => Ok(str),
            Err(err) => eyre::bail!("cannot decode: {err}"),
        }
    }

    fn pending_prefix(&self) -> Result<String> {
        if self.tokens.is_empty() {
            Ok(String::new())
        } else {
            self.decode(&self.tokens[self.prev_index..self.current_index])
        }
    }

    // https://github.com/huggingface/text-generation-inference/blob/5ba53d44a18983a4de32d122f4cb46f4a17d9ef6/server/text_generation_server/models/model.py#L68
    pub fn next_token(&mut self, token: u32) -> Result<Option<String>> {
        let prev_text = self.pending_prefix()?;
        self.tokens.push(token);
        let text = self.decode(&self.tokens[self.prev_index..])?;

        let complete = text
            .chars()
            .last()
            .is_some_and(|c| c.is_alphanumeric() || c.is_ascii_punctuation());

        if text.len() > prev_text.len() && complete {
            let (_, piece) = text.split_at(prev_text.len());
            self.prev_index = self.current_index;
            self.current_index = self.tokens.len();
            Ok(Some(piece.to_string()))
        } else {
            Ok(None)
        }
    }

    /// Whatever is still buffered once generation stops.
    pub fn decode_rest(&self) -> Result<Option<String>> {
        let prev_text = self.pending_prefix()?;
        let text = self.decode(&self.tokens[self.prev_index..])?;

        if text.len() > prev_text.len() {
            let (_, piece) = text.split_at(prev_text.len());
            Ok(Some(piece.to_string()))
        } else {
            Ok(None)
        }
    }

    pub fn decode_all(&self) -> Result<String> {
        self.decode(&self.tokens)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
