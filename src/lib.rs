//! # Series Resolver
//!
//! Resolves a free-text request for an economic indicator ("US inflation over
//! the last decade") into a concrete catalogued data series and an
//! observation date range.
//!
//! Resolution is cache-first: a semantic index of previously enriched series
//! is consulted before a live keyword search of the external catalog, and
//! every newly discovered series is enriched and stored so the next request
//! for the same concept resolves from the index.
//!
//! ## Architecture
//!
//! ```text
//!                ┌───────────────────────┐
//!   raw query ──▶│ QueryMetadataExtractor │──▶ region, concept, dates
//!                └───────────┬───────────┘
//!                            ▼
//!                ┌───────────────────────┐     ┌──────────────┐
//!                │ SeriesResolutionEngine │────▶│ SemanticIndex │ (1) cache
//!                └───────────┬───────────┘     └──────▲───────┘
//!                            │ (2) fallback           │ (3) enrich + store
//!                            ▼                        │
//!                     ┌─────────────┐          ┌──────┴───────┐
//!                     │   Catalog   │─────────▶│   Enricher    │
//!                     └─────────────┘          └──────────────┘
//! ```
//!
//! Every external capability (embedding, index, catalog, reasoning oracle)
//! sits behind a trait and is injected, so the whole pipeline runs against
//! deterministic stubs in tests.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy and timeouts |
//! | [`models`] | Core data types |
//! | [`region`] | Region name normalization |
//! | [`dates`] | Time references and date range resolution |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Semantic index abstraction and backends |
//! | [`catalog`] | Catalog search abstraction and FRED backend |
//! | [`oracle`] | Reasoning oracle abstraction |
//! | [`enrich`] | Enrichment-and-store of discovered series |
//! | [`resolve`] | Series resolution engine |
//! | [`query_metadata`] | Query metadata extraction |
//! | [`seed`] | Core series seeding |
//! | [`pipeline`] | End-to-end wiring from config |
//! | [`server`] | HTTP server |

pub mod catalog;
pub mod config;
pub mod dates;
pub mod embedding;
pub mod enrich;
pub mod error;
pub mod http;
pub mod index;
pub mod models;
pub mod oracle;
pub mod pipeline;
pub mod query_metadata;
pub mod region;
pub mod resolve;
pub mod seed;
pub mod server;
