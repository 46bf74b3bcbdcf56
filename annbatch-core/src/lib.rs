//! # annbatch Core
//!
//! Building blocks shared by the annbatch crates:
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  annbatch-core                  │
//! ├─────────────────────────────────────────────────┤
//! │  • error    - Error type and Result alias       │
//! │  • config   - Index / parallel / logging config │
//! │  • metrics  - Shared counters and timers       │
//! │  • parallel - Range partitioner                │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod parallel;

// Re-export commonly used types
pub use config::{Config, EngineKind, SpaceKind};
pub use error::{Error, Result, ResultExt};
pub use metrics::{Metrics, MetricsSnapshot, Timer};
pub use parallel::{parallel_for, split_input_range, ChunkOutcome};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
