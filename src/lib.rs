//! reelsight library
//!
//! Accepts a short-form video (uploaded file or public URL) plus an optional
//! focus prompt, forwards it to a multimodal chat-completions provider, and
//! relays the analysis back as JSON or as a verbatim event stream.

pub mod cli;
pub mod config;
pub mod logging;
pub mod media;
pub mod server;
