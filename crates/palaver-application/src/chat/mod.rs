//! Chat application services.
//!
//! This module contains the services that keep streamed generations and the
//! in-memory transcript cache coherent:
//!
//! - `cache`: keyed store of full session transcripts
//! - `controller`: per-session generation lifecycle and cancellation
//! - `reconciler`: applies parsed stream events to cached transcripts
//! - `classify`: maps failures to recoverable vs terminal outcomes
//! - `events`: outcomes surfaced to the UI shell
//! - `service`: the facade that wires everything together

mod cache;
mod classify;
mod controller;
mod events;
mod reconciler;
mod service;

pub use cache::SessionCacheService;
pub use classify::{classify, FailureKind};
pub use controller::{GenerationController, GenerationHandle, GenerationMode};
pub use events::{ChatEvent, EventReceiver, EventSender};
pub use reconciler::{ReconcileOutcome, ReconciliationEngine};
pub use service::ChatService;
