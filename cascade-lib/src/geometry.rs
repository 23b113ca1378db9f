// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # View geometry
//!
//! Zoom, pan, and viewport state, recomputed whenever any input changes.  The zoom decides which
//! pyramid level the renderer samples; that choice is a pure coordinate computation here, so no
//! row data is ever touched when the user zooms.

use crate::line::LevelMap;

/// Pyramid level picked for the current view, with its location inside the row allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelSelect {
    pub level: usize,
    pub offset: usize,
    pub width: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct Geometry {
    zoom: f32,
    center: f32,
    c_x0: f32,
    c_x1: f32,
    width: u32,
    height: u32,
}

impl Geometry {
    pub fn new() -> Self {
        let mut geometry = Geometry {
            zoom: 1.0,
            center: 0.5,
            c_x0: 0.0,
            c_x1: 1.0,
            width: 0,
            height: 0,
        };
        geometry.recalc();
        geometry
    }

    /// Recompute the cached view transform.  Must be invoked whenever viewport size or zoom
    /// changes; no side effects beyond the cache.
    pub fn recalc_geometric(&mut self, width: u32, height: u32, zoom: f32) {
        self.width = width;
        self.height = height;
        self.zoom = if zoom.is_finite() { zoom.max(1.0) } else { 1.0 };
        self.recalc();
    }

    /// Pan to a new normalized center.  Clamped so the visible span stays inside `[0, 1]`.
    pub fn set_center(&mut self, center: f32) {
        self.center = center;
        self.recalc();
    }

    fn recalc(&mut self) {
        let span = 1.0 / self.zoom;
        let half = span * 0.5;
        self.center = self.center.clamp(half, 1.0 - half);
        self.c_x0 = self.center - half;
        self.c_x1 = self.center + half;
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn center(&self) -> f32 {
        self.center
    }

    /// Visible normalized frequency span `[c_x0, c_x1]`.
    pub fn span(&self) -> (f32, f32) {
        (self.c_x0, self.c_x1)
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Pick the pyramid level whose bin density best matches the viewport: the coarsest level
    /// that still supplies at least one bin per pixel across the visible span.
    pub fn select_level(&self, map: &LevelMap) -> LevelSelect {
        let pixels = self.width.max(1) as f32;
        let visible_bins = (self.c_x1 - self.c_x0) * map.resolution() as f32;
        let decimation = (visible_bins / pixels).max(1.0);

        let level = (decimation.log2().floor() as usize).min(map.levels() - 1);
        let (offset, width) = map.span(level);
        LevelSelect {
            level,
            offset,
            width,
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_full_span_at_unity_zoom() {
        let mut geometry = Geometry::new();
        geometry.recalc_geometric(1024, 768, 1.0);
        assert_eq!(geometry.span(), (0.0, 1.0));
    }

    #[test]
    fn test_zoom_narrows_around_center() {
        let mut geometry = Geometry::new();
        geometry.recalc_geometric(1024, 768, 4.0);
        let (x0, x1) = geometry.span();
        assert!((x1 - x0 - 0.25).abs() < 1e-6);
        assert!((geometry.center() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_pan_clamps_to_edges() {
        let mut geometry = Geometry::new();
        geometry.recalc_geometric(1024, 768, 2.0);
        geometry.set_center(0.0);
        assert_eq!(geometry.span(), (0.0, 0.5));
        geometry.set_center(1.0);
        let (x0, x1) = geometry.span();
        assert!((x0 - 0.5).abs() < 1e-6 && (x1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_zoom_clamped() {
        let mut geometry = Geometry::new();
        geometry.recalc_geometric(100, 100, 0.1);
        assert_eq!(geometry.zoom(), 1.0);
        geometry.recalc_geometric(100, 100, f32::NAN);
        assert_eq!(geometry.zoom(), 1.0);
    }

    #[test]
    fn test_level_selection_tracks_zoom() {
        let map = LevelMap::new(8192).unwrap();
        let mut geometry = Geometry::new();

        // 8192 visible bins over 1024 pixels: 8x decimation, level 3.
        geometry.recalc_geometric(1024, 768, 1.0);
        let select = geometry.select_level(&map);
        assert_eq!(select.level, 3);
        assert_eq!((select.offset, select.width), (14336, 1024));

        // Zoomed 8x: the visible bins match the pixels, full detail.
        geometry.recalc_geometric(1024, 768, 8.0);
        assert_eq!(geometry.select_level(&map).level, 0);

        // Tiny viewport clamps to the coarsest level that exists.
        geometry.recalc_geometric(1, 1, 1.0);
        let select = geometry.select_level(&map);
        assert_eq!(select.level, map.levels() - 1);
        assert_eq!(select.width, 1);
    }
}
