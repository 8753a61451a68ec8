//! Remote document store abstraction for CareSync.
//!
//! This module provides a trait-based interface for the remote side of the
//! sync engine: a document database addressed by collection and record id,
//! with get-all, get-by-id, upsert-by-id and delete-by-id semantics.
//!
//! # Design Principles
//! - Backend isolation: no backend-specific logic in the engine
//! - Async operations: remote calls are the only suspension points of a run
//! - Unified error semantics: failures map onto the common error taxonomy
//!   so the engine can classify them for retry

pub mod http;
pub mod memory;
pub mod provider;

pub use http::{HttpRemote, HttpRemoteConfig};
pub use memory::{FaultKind, MemoryRemote};
pub use provider::{Document, QueryFilter, RemoteStore};
