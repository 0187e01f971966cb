//! Purpose: Library crate behind the `pointseg` CLI.
//! Exports: `api` (stable surface), `core` (store, registry, pipeline, errors), `models`.
//! Role: Point-prompted image segmentation with a local, verified model cache.
//! Invariants: Library code never writes to stdout; diagnostics go through `tracing`.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod model_paths;
pub mod models;
