//! moss-llmd: local LLM host daemon for the Moss chat app.
//!
//! Owns a llama.cpp-style native inference engine and exposes its lifecycle
//! to the desktop UI over a local HTTP API:
//!   list/load/unload model → chat turns with token + throughput accounting
//! with SSE notifications for load progress and generation lifecycle.
//!
//! The engine itself (inference, tokenization, sampling) lives behind the
//! adapter boundary in [`llama`]; this crate only coordinates it.

pub mod chat;
pub mod config;
pub mod llama;
pub mod model;
pub mod server;
