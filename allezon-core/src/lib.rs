//! allezon-core: Core library for the allezon tag analytics service
//!
//! This crate provides the building blocks behind the HTTP surface:
//!
//! - **Model** - [`UserTag`] and the closed enums ([`Action`], [`Device`], [`Aggregate`])
//! - **Store** - [`KvBackend`] and [`OccStore`] for generation-checked read-modify-write
//! - **Profiles** - [`ProfileStore`] keeping capped, newest-first event lists per user
//! - **Ingestion** - [`Ingestor`] updating profiles and publishing tags
//! - **Rollups** - [`fan_out`], [`RollupAccumulator`] and [`QueryResolver`]
//!
//! # Architecture
//!
//! ```text
//! tag ──► Ingestor ──► ProfileStore (OccStore ─► KvBackend)
//!            │
//!            ▼
//!        tag stream ──► Forwarder ──► increment stream ──► RollupAccumulator
//!                                                              ▲      │ flush
//!                                            QueryResolver ────┘      ▼
//!                                                               KvRollupTable
//! ```

#[macro_use]
pub mod model;

pub mod aggregate;
pub mod config;
pub mod error;
pub mod ingest;
pub mod profile;
pub mod rollup;
pub mod store;

pub use aggregate::{
    AggregateQuery, AggregateTable, Forwarder, Increment, KvRollupTable, QueryError,
    QueryResolver, RollupAccumulator, RollupCounter, RollupLookup, RollupTable, fan_out,
};
pub use config::{QueryConfig, RollupConfig, StoreConfig};
pub use error::{AllezonError, ValidationError};
pub use ingest::{IngestError, Ingestor};
pub use model::{Action, Aggregate, AggregateColumn, Device, Product, TimeRange, UserTag};
pub use profile::{PROFILE_CAP, ProfileStore, UserProfile};
pub use rollup::{Dimension, Dimensions, RollupKey, derive_key};
pub use store::{KvBackend, MemoryKvBackend, OccStore, StoreError};
