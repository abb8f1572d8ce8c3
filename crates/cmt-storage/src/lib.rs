//! CMT Storage
//!
//! Comment persistence backends behind the [`cmt_core::CommentProvider`]
//! contract.
//!
//! # Overview
//!
//! - **MemoryCommentStore**: table-backed reference provider (key `default`)
//! - **ProviderRegistry**: named backends with an enabled flag and one active key
//!
//! # Example
//!
//! ```rust
//! use cmt_storage::ProviderRegistry;
//! use cmt_core::SystemClock;
//! use std::sync::Arc;
//!
//! let registry = ProviderRegistry::with_defaults(Arc::new(SystemClock));
//! assert_eq!(registry.active_key(), Some("default"));
//! let provider = registry.active().unwrap();
//! ```

#![warn(missing_docs)]

pub mod memory;
pub mod registry;

// Re-exports
pub use memory::MemoryCommentStore;
pub use registry::ProviderRegistry;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
