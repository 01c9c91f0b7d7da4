//! Transport layer for browser-remote.
//!
//! Currently provides HTTP transport via axum.

pub mod http;

pub use http::{ServerConfig, serve, serve_on};
