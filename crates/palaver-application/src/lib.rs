//! Application layer for Palaver.
//!
//! This crate coordinates the domain and infrastructure layers into the
//! streaming generation session manager: the session cache, the generation
//! controller, the reconciliation engine, and the `ChatService` facade that
//! drives streams against the backend gateway.

pub mod chat;

pub use chat::{ChatEvent, ChatService, GenerationController, SessionCacheService};
