//! Model side of the NL→SQL demo: device selection, loading a Llama-family
//! text-generation model with candle, and serving prompts from a small pool
//! of inference threads.

pub mod chat;
pub mod device;
pub mod generation;
pub mod hub;
pub mod loader;
pub mod model;
pub mod token_output_stream;
pub mod worker;

pub use chat::{Message, Role};
pub use device::{DeviceKind, HostCapabilities};
pub use generation::{Generate, Generated, GenerationParams};
pub use hub::ModelSource;
pub use loader::ModelLoader;
pub use worker::{Driver, DriverError, DriverHandle};
