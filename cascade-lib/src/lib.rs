// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core Cascade waterfall bookkeeping.
//!
//! A waterfall is a scrolling 2D view of spectral magnitude over time.  Rows of spectrum data
//! arrive continuously and are eventually sampled by a GPU renderer at an arbitrary zoom level.
//! The trick that keeps zooming free is that every row is stored as a small pyramid: the full
//! resolution bins plus a precomputed reduction at every power-of-two decimation factor, packed
//! into a single `2R` allocation.  Rendering at any zoom is then an indexing decision, never a
//! recomputation.
//!
//! This crate is the CPU side only: building pyramid rows incrementally ([`line::PyramidLine`]),
//! recycling their buffers through a checkout/return pool and a bounded backlog of rows awaiting
//! device upload ([`backlog`]), the circular addressing of the device-resident row grid
//! ([`ring`]), and the small bits of presentation state that the renderer consumes directly
//! (dynamic range, palette, view geometry).  Nothing here touches a GPU, which keeps all of the
//! row math unit-testable.  The `cascade-visualizer` crate owns the device resources and the
//! actual draws.

pub mod backlog;
pub mod geometry;
pub mod line;
pub mod palette;
pub mod range;
pub mod ring;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CascadeError {
    #[error("resolution must be a positive bin count")]
    InvalidResolution,

    #[error("row count must be positive")]
    InvalidRowCount,

    #[error("row length mismatch: expected {expected} bins, got {got}")]
    SizeMismatch { expected: usize, got: usize },

    #[error("empty input row")]
    EmptyInput,

    #[error("dynamic range must be finite with max > min")]
    InvalidRange,

    #[error("no line pending")]
    NothingPending,
}

pub mod prelude {
    pub use super::CascadeError;
    pub use crate::backlog::{Backlog, Blending, LinePool};
    pub use crate::geometry::Geometry;
    pub use crate::line::PyramidLine;
    pub use crate::palette::Palette;
    pub use crate::range::DynamicRange;
    pub use crate::ring::{RingCursor, RowStore};
}
