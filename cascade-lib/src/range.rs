// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Dynamic range
//!
//! Linear transform from magnitude in dB to normalized display intensity.  The coefficients are
//! derived once at configuration time; clamping to `[0, 1]` happens at sample time so the
//! configured span never has to anticipate outliers.

use crate::CascadeError;

#[derive(Clone, Copy, Debug)]
pub struct DynamicRange {
    min_db: f32,
    max_db: f32,
    scale: f32,
    offset: f32,
}

impl DynamicRange {
    /// `scale * min + offset == 0` and `scale * max + offset == 1`.
    pub fn new(min_db: f32, max_db: f32) -> Result<Self, CascadeError> {
        if !min_db.is_finite() || !max_db.is_finite() || max_db <= min_db {
            return Err(CascadeError::InvalidRange);
        }
        let scale = 1.0 / (max_db - min_db);
        Ok(DynamicRange {
            min_db,
            max_db,
            scale,
            offset: -min_db * scale,
        })
    }

    pub fn set(&mut self, min_db: f32, max_db: f32) -> Result<(), CascadeError> {
        *self = DynamicRange::new(min_db, max_db)?;
        Ok(())
    }

    /// Shader-side coefficients.
    pub fn coefficients(&self) -> (f32, f32) {
        (self.scale, self.offset)
    }

    pub fn span(&self) -> (f32, f32) {
        (self.min_db, self.max_db)
    }

    /// Map a magnitude into display intensity, clamped to `[0, 1]`.
    pub fn map(&self, db: f32) -> f32 {
        (self.scale * db + self.offset).clamp(0.0, 1.0)
    }
}

impl Default for DynamicRange {
    /// Typical dBFS span for spectrum displays.
    fn default() -> Self {
        DynamicRange::new(-100.0, 0.0).unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_endpoints() {
        let range = DynamicRange::new(-90.0, -20.0).unwrap();
        assert!((range.map(-90.0)).abs() < 1e-6);
        assert!((range.map(-20.0) - 1.0).abs() < 1e-6);
        assert!((range.map(-55.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_clamps_at_sample_time() {
        let range = DynamicRange::new(-100.0, 0.0).unwrap();
        assert_eq!(range.map(-200.0), 0.0);
        assert_eq!(range.map(50.0), 1.0);
        for db in [-150.0, -100.0, -42.5, 0.0, 13.0] {
            let v = range.map(db);
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_rejects_degenerate_spans() {
        assert!(DynamicRange::new(0.0, 0.0).is_err());
        assert!(DynamicRange::new(-10.0, -20.0).is_err());
        assert!(DynamicRange::new(f32::NAN, 0.0).is_err());
        assert!(DynamicRange::new(-10.0, f32::INFINITY).is_err());

        // A rejected set leaves the previous configuration intact.
        let mut range = DynamicRange::new(-80.0, -10.0).unwrap();
        assert!(range.set(5.0, 5.0).is_err());
        assert_eq!(range.span(), (-80.0, -10.0));
    }
}
