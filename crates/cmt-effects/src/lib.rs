//! CMT Effects
//!
//! Work that runs after a comment write has committed. Nothing here can fail
//! the write that triggered it.
//!
//! # Overview
//!
//! - **IndexSync**: full recompute of a page's `extra.comment` snapshot, then
//!   a search index upsert
//! - **NotificationDispatcher**: single message to the operational address
//! - **EffectWorker**: background consumer with bounded concurrency
//!
//! # Example
//!
//! ```rust,ignore
//! use cmt_effects::{EffectWorker, IndexSync, PostCommitHandler};
//! use std::sync::Arc;
//!
//! let handler = PostCommitHandler::new(IndexSync::new(provider, pages, search), None);
//! let (queue, worker) = EffectWorker::spawn(Arc::new(handler), 4);
//! // hand `queue` to the orchestrator as its EffectScheduler
//! let stats = worker.shutdown().await;
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod index_sync;
pub mod notify;
pub mod worker;

// Re-exports
pub use error::EffectError;
pub use index_sync::{IndexSync, SyncOutcome};
pub use notify::{NotificationDispatcher, NotificationSettings};
pub use worker::{EffectHandler, EffectQueue, EffectStats, EffectWorker, PostCommitHandler};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
