//! HTTP surface of the gateway: router, error mapping and route handlers.

pub mod handler;
pub mod recording;
pub mod recordings;
pub mod tokens;
