//! Chat backend client and types
//!
//! The backend takes the latest user message plus a session id and streams
//! the reply back as tagged frames (see [`crate::stream`]).

mod client;
mod types;

pub use client::HttpBackend;
pub use types::{ChatBackend, ChatRequest};
