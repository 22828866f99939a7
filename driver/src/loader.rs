use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use eyre::Result;
use once_cell::sync::OnceCell;
use tracing::info;

use crate::device::DeviceKind;
use crate::generation::{Generate, Pipeline};
use crate::hub::ModelSource;
use crate::model::Model;

type Factory = Box<dyn Fn() -> Result<Arc<dyn Generate>> + Send + Sync>;

/// Process-wide cache of the model handle.
///
/// The expensive load runs at most once successfully; every later
/// [`ModelLoader::handle`] call returns the same `Arc`. A failed load leaves
/// the cache empty so the error reaches whoever asked.
pub struct ModelLoader {
    factory: Factory,
    cell: OnceCell<Arc<dyn Generate>>,
    loads: AtomicUsize,
}

impl ModelLoader {
    pub fn new(source: ModelSource, kind: DeviceKind) -> Self {
        Self::with_factory(move || {
            let model = Model::load(&source, kind)?;

            Ok(Arc::new(Pipeline::new(model)) as Arc<dyn Generate>)
        })
    }

    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Generate>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            cell: OnceCell::new(),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn handle(&self) -> Result<Arc<dyn Generate>> {
        self.cell
            .get_or_try_init(|| {
                let attempt = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
                info!(attempt, "loading model");

                (self.factory)()
            })
            .cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Number of load attempts so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::thread;

    use super::*;
    use crate::chat::Message;
    use crate::generation::{GenerationParams, Generated};

    struct Echo;

    impl Generate for Echo {
        fn generate(&self, messages: &[Message], _: &GenerationParams) -> Result<Vec<Generated>> {
            Ok(vec![Generated {
                generated_text: messages[0].content.clone(),
            }])
        }
    }

    #[test]
    fn loads_once_across_threads() {
        let loader = Arc::new(ModelLoader::with_factory(|| {
            thread::sleep(std::time::Duration::from_millis(10));
            Ok(Arc::new(Echo) as Arc<dyn Generate>)
        }));

        let threads = (0..8)
            .map(|_| {
                let loader = loader.clone();
                thread::spawn(move || loader.handle().map(|_| ()))
            })
            .collect::<Vec<_>>();

        for t in threads {
            t.join().unwrap().unwrap();
        }

        assert_eq!(loader.loads(), 1);
        assert!(loader.is_loaded());

        let a = loader.handle().unwrap();
        let b = loader.handle().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn failed_load_is_retried() {
        let fail = Arc::new(AtomicBool::new(true));
        let loader = {
            let fail = fail.clone();
            ModelLoader::with_factory(move || {
                if fail.load(Ordering::SeqCst) {
                    eyre::bail!("weights unavailable")
                }
                Ok(Arc::new(Echo) as Arc<dyn Generate>)
            })
        };

        let err = loader.handle().err().unwrap();
        assert!(err.to_string().contains("weights unavailable"));
        assert!(!loader.is_loaded());

        fail.store(false, Ordering::SeqCst);

        let handle = loader.handle().unwrap();
        let out = handle
            .generate(&[Message::user("ping")], &GenerationParams::default())
            .unwrap();

        assert_eq!(out[0].generated_text, "ping");
        assert_eq!(loader.loads(), 2);
    }
}
