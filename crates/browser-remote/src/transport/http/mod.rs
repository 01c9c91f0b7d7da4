//! HTTP transport: one route that relays a query to the native peer.

pub mod routes;
pub mod server;

pub use routes::routes;
pub use server::{ServerConfig, serve, serve_on};
