//! Natural-language to SQL demo: a single web page that sends a question to a
//! fine-tuned text-generation model and shows the answer as formatted SQL.

pub mod catalog;
pub mod config;
pub mod controller;
pub mod format;
pub mod session;
pub mod telemetry;
pub mod web;

pub use controller::{Controller, Rendered};
pub use format::{SqlCheck, SqlFormatter};
pub use session::{InputState, Session, SessionStore};
