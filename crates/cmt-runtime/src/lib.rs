//! CMT Runtime
//!
//! Everything needed to run the comment lifecycle as a service:
//! - `config`: TOML configuration with defaults and validation
//! - `telemetry`: tracing subscriber setup
//! - `service`: wiring of provider registry, orchestrator and effect worker
//! - `simulator`: seeded workload used by the `cmt-sim` binary (feature
//!   `simulator`, on by default)
//!
//! # Example
//!
//! ```rust,ignore
//! use cmt_runtime::{CommentService, CommentsConfig};
//!
//! let config = CommentsConfig::load("comments.toml")?;
//! let service = CommentService::from_config(&config, collaborators)?;
//! let comment = service.orchestrator().create(request).await?;
//! service.shutdown().await;
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod service;
#[cfg(feature = "simulator")]
pub mod simulator;
pub mod telemetry;

// Re-exports
pub use config::{CommentsConfig, ConfigError};
pub use service::{Collaborators, CommentService, ServiceError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
