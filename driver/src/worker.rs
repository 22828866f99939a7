use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use eyre::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat::Message;
use crate::generation::{Generate, GenerationParams, Generated};
use crate::loader::ModelLoader;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("the inference driver is not running")]
    NotRunning,
    #[error("the inference driver dropped prompt {0}")]
    Dropped(Uuid),
}

struct Prompt {
    id: Uuid,
    messages: Vec<Message>,
    params: GenerationParams,
    reply: Sender<Result<Vec<Generated>>>,
}

/// One inference worker. Pulls prompts off the shared queue and answers each
/// on the prompt's own reply channel.
pub struct Driver {
    loader: Arc<ModelLoader>,
    prompts: Receiver<Prompt>,
}

impl Driver {
    /// Spawn `workers` inference threads sharing one queue of `queue` slots.
    ///
    /// The threads exit once every [`DriverHandle`] is dropped.
    pub fn boot(loader: Arc<ModelLoader>, workers: usize, queue: usize) -> Result<DriverHandle> {
        let (ptx, prx) = bounded::<Prompt>(queue.max(1));

        for n in 0..workers.max(1) {
            let mut driver = Self {
                loader: loader.clone(),
                prompts: prx.clone(),
            };

            thread::Builder::new()
                .name(format!("inference-{n}"))
                .spawn(move || while driver.push() {})
                .wrap_err("failed to spawn inference worker")?;
        }

        info!(workers, queue, "inference driver running");

        Ok(DriverHandle { prompt: ptx })
    }

    /// Serve a single prompt. Returns false once the queue is closed.
    fn push(&mut self) -> bool {
        let Ok(prompt) = self.prompts.recv() else {
            debug!("prompt queue closed, stopping worker");
            return false;
        };

        let start = Instant::now();

        let result = self
            .loader
            .handle()
            .and_then(|model| model.generate(&prompt.messages, &prompt.params));

        match &result {
            Ok(_) => debug!(id = %prompt.id, elapsed = ?start.elapsed(), "prompt answered"),
            Err(e) => warn!(id = %prompt.id, error = %e, "prompt failed"),
        }

        if prompt.reply.send(result).is_err() {
            debug!(id = %prompt.id, "requester went away before the answer");
        }

        true
    }
}

/// Cheap, cloneable entry point into the running [`Driver`] threads.
#[derive(Clone, Debug)]
pub struct DriverHandle {
    prompt: Sender<Prompt>,
}

impl DriverHandle {
    /// Queue a conversation and block until a worker answers it.
    pub fn prompt(&self, messages: &[Message], params: &GenerationParams) -> Result<Vec<Generated>> {
        let id = Uuid::new_v4();
        let (tx, rx) = bounded(1);

        self.prompt
            .send(Prompt {
                id,
                messages: messages.to_vec(),
                params: params.clone(),
                reply: tx,
            })
            .map_err(|_| DriverError::NotRunning)?;

        debug!(%id, "prompt queued");

        rx.recv().map_err(|_| DriverError::Dropped(id))?
    }
}

impl Generate for DriverHandle {
    fn generate(&self, messages: &[Message], params: &GenerationParams) -> Result<Vec<Generated>> {
        self.prompt(messages, params)
    }
}
