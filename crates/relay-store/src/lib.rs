//! # Relay Store
//!
//! Task record persistence for the relay pipeline. Enforces the status
//! transition invariant (`pending → running → {completed, failed}`, with
//! `failed → running` reserved for retry claims) and provides the atomic
//! claim primitive that guarantees at most one concurrent execution per
//! task id.
//!
//! The in-memory implementation is the reference store; production
//! deployments swap in a database-backed implementation of the same traits.

pub mod error;
pub mod memory;
pub mod transitions;

pub use error::{Result, StoreError};
pub use memory::{InMemoryTaskStore, InMemoryWebhookStore};
pub use transitions::validate_transition;
