//! Ullama: a terminal chat client for a local Ollama runtime, plus the small
//! HTTP proxy it talks through.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod logging;
pub mod markdown;
pub mod proxy;
pub mod server;
pub mod session;
pub mod ui;
