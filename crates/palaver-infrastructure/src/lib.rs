//! Infrastructure layer for Palaver.
//!
//! This crate provides the protocol and transport implementations behind
//! the core gateway trait: the SSE frame parser and the reqwest-based HTTP
//! gateway.

pub mod http_gateway;
pub mod sse;

pub use http_gateway::HttpChatGateway;
pub use sse::FrameParser;
