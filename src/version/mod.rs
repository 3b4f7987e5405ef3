//! Release resolution layer
//!
//! This module fetches published releases, orders them, picks the release an
//! update channel should be on and remembers what was last offered.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Registry   │────▶│   Checker   │────▶│    Cache    │
//! │  (fetch)    │     │ (throttle)  │     │  (storage)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                   │
//!        ▼                   ▼
//! ┌─────────────┐     ┌─────────────┐
//! │ Registries  │     │   Channel   │──▶ semver (version order)
//! │  (GitHub)   │     │ (decision)  │
//! └─────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: SQLite store for channel preference, check throttle and cached update
//! - [`channel`]: Sorting, applicable-release resolution and update decisions
//! - [`checker`]: Throttled, single-flight update checks
//! - [`registry`]: Release source trait
//! - [`registries`]: Concrete release sources (GitHub Releases)
//! - [`error`]: Error types for cache, registry and check operations
//! - [`semver`]: Version parsing and total ordering
//! - [`types`]: Release, channel and decision types

pub mod cache;
pub mod channel;
pub mod checker;
pub mod error;
pub mod registries;
pub mod registry;
pub mod semver;
pub mod types;
