//! # annbatch Index
//!
//! Batch insert and query orchestration over approximate nearest neighbor
//! engines.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        BatchIndex<E>                         │
//! │    labels · cursor · layouts · partial-failure handling      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │   Policy    │    │   Matrix    │    │  parallel   │     │
//! │  │ normalize / │    │ row / col   │    │    _for     │     │
//! │  │    sqrt     │    │   major     │    │  (core)     │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! │                           │                                  │
//! │                    AnnEngine Trait                           │
//! │                           │                                  │
//! │         ┌─────────────────┴─────────────────┐               │
//! │  ┌─────────────┐                     ┌─────────────┐        │
//! │  │    Flat     │                     │   Vamana    │        │
//! │  │  (Exact)    │                     │   Graph     │        │
//! │  └─────────────┘                     └─────────────┘        │
//! │         └──────────── SIMD kernels ─────────┘               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `simd`: distance kernels (AVX2/FMA, unrolled fallback)
//! - `traits`: the `AnnEngine` contract
//! - `flat`: brute-force exact engine
//! - `vamana`: graph engine
//! - `policy`: normalization and distance transforms
//! - `space`: metric space descriptors
//! - `matrix`: layout-aware batch buffers
//! - `batch`: the orchestrator

pub mod simd;
pub mod traits;
pub mod flat;
pub mod vamana;
pub mod policy;
pub mod space;
pub mod matrix;
pub mod batch;

pub use simd::{dot_product, l2_distance_squared, squared_norm, DistanceMetric};

pub use traits::{AnnEngine, EngineParams, SearchResult};
pub use flat::FlatIndex;
pub use vamana::{VamanaConfig, VamanaIndex};
pub use policy::{DistanceTransform, Normalization};
pub use space::Space;
pub use matrix::{Layout, Matrix, MatrixView};
pub use batch::{BatchIndex, IndexOptions, NeighborList, NeighborMatrix, SENTINEL_DISTANCE, SENTINEL_LABEL};
