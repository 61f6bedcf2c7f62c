//! Batch charts for additive-manufacturing alloy test data: per-regime
//! property plots, averaged replicate curves and stacked diffraction patterns.
//!
//! ```text
//!   job.json ──► config ──► pipeline ──► data ──► analysis ──► render ──► png / svg
//!                  │                                 ▲
//!                  └──────────── regime table ───────┘
//! ```

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod regime;
pub mod render;
