//! Dropgate Core - Download-Limited File Serving
//!
//! This crate provides the access-gating layer for Dropgate: a static file
//! server where every file may only be downloaded a fixed number of times.
//! The [`AccessTracker`] owns the per-file counters; the [`DownloadGate`]
//! wraps a static content delegate and turns counter state into HTTP
//! outcomes.

mod error;
mod gate;
mod tracker;

pub use error::*;
pub use gate::*;
pub use tracker::*;
