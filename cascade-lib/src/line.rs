// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Pyramid lines
//!
//! One waterfall row holds one moment in time.  Alongside the full-resolution bins it carries a
//! reduction at every power-of-two decimation factor, so the renderer can pick whichever level
//! matches the current zoom with plain indexing.  The packing for `R = 4` looks like `AAAABBCX`:
//! four full-detail bins, two half-resolution bins, one quarter, and the single-bin apex.  The
//! whole stack fits in `2 * R` floats by the geometric series bound.
//!
//! Levels can be built two ways: incrementally, one base bin at a time while the row is being
//! accumulated ([`PyramidLine::set_value_max`] / [`PyramidLine::set_value_mean`]), or in a batch
//! from a finished level 0 ([`PyramidLine::rescale_max`] / [`PyramidLine::rescale_mean`]).

use crate::CascadeError;

/// Allocation length for a base resolution: level 0 plus all reductions.
pub fn allocation_for(resolution: usize) -> usize {
    resolution << 1
}

/// Inverse of [`allocation_for`].
pub fn resolution_for(allocation: usize) -> usize {
    allocation >> 1
}

/// Precomputed `(offset, width)` of every pyramid level within a row allocation.
///
/// Built once per resolution so the per-sample paths never redo the shift arithmetic and the
/// level boundaries can be inspected on their own.
#[derive(Clone, Debug, PartialEq)]
pub struct LevelMap {
    spans: Vec<(usize, usize)>,
    resolution: usize,
}

impl LevelMap {
    pub fn new(resolution: usize) -> Result<Self, CascadeError> {
        if resolution == 0 {
            return Err(CascadeError::InvalidResolution);
        }

        let levels = resolution.ilog2() as usize + 1;
        let mut spans = Vec::with_capacity(levels);
        let mut offset = 0;
        let mut width = resolution;
        for _ in 0..levels {
            spans.push((offset, width));
            offset += width;
            width >>= 1;
        }

        Ok(LevelMap { spans, resolution })
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn levels(&self) -> usize {
        self.spans.len()
    }

    /// `(offset, width)` of a level.  Panics on an out-of-range level; callers clamp.
    pub fn span(&self, level: usize) -> (usize, usize) {
        self.spans[level]
    }

    pub fn spans(&self) -> &[(usize, usize)] {
        &self.spans
    }
}

/// A single waterfall row with its reduction pyramid, packed into one `2R` float buffer.
///
/// Rows are recycled through `backlog::LinePool`, so the buffer is reused across
/// `set_resolution` calls whenever the allocation still matches.
#[derive(Clone, Debug)]
pub struct PyramidLine {
    data: Vec<f32>,
    map: LevelMap,
    /// Completed mean-accumulation passes, counted by contributions to base bin 0.
    passes: u32,
}

impl PyramidLine {
    pub fn new(resolution: usize) -> Result<Self, CascadeError> {
        let map = LevelMap::new(resolution)?;
        Ok(PyramidLine {
            data: vec![0.0; allocation_for(resolution)],
            map,
            passes: 0,
        })
    }

    /// Reconfigure for a new base resolution, zeroing all entries.  The backing allocation is
    /// reused when it already has the right length.
    pub fn set_resolution(&mut self, resolution: usize) -> Result<(), CascadeError> {
        let map = LevelMap::new(resolution)?;
        self.data.clear();
        self.data.resize(allocation_for(resolution), 0.0);
        self.map = map;
        self.passes = 0;
        Ok(())
    }

    pub fn resolution(&self) -> usize {
        self.map.resolution()
    }

    pub fn allocation(&self) -> usize {
        self.data.len()
    }

    pub fn levels(&self) -> usize {
        self.map.levels()
    }

    /// All levels, packed.  This is exactly what gets written into a ring buffer row slot.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn level(&self, level: usize) -> &[f32] {
        let (offset, width) = self.map.span(level);
        &self.data[offset..offset + width]
    }

    /// Zero every entry and forget any accumulation state.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.passes = 0;
    }

    /// Max-hold a single base bin through every level in one pass.
    ///
    /// Once every base index has been set, level `k` position `j` holds the maximum of base bins
    /// `[j * 2^k, (j + 1) * 2^k)`.
    pub fn set_value_max(&mut self, index: usize, val: f32) {
        let mut index = index;
        for &(offset, _) in self.map.spans() {
            let i = offset + index;
            if val > self.data[i] {
                self.data[i] = val;
            }
            index >>= 1;
        }
    }

    /// Accumulate a single base bin through every level, halving the weight per level.
    ///
    /// Precondition: one call per base index per accumulation pass, then [`normalize`].  A
    /// single complete pass leaves level `k` position `j` holding the arithmetic mean of its
    /// `2^k` base bins; further passes sum means until `normalize` divides them back out.
    /// Skipped or doubled indices silently skew the averages; there is no runtime detection.
    ///
    /// [`normalize`]: PyramidLine::normalize
    pub fn set_value_mean(&mut self, index: usize, val: f32) {
        if index == 0 {
            self.passes += 1;
        }
        let mut index = index;
        let mut weight = 1.0f32;
        for &(offset, _) in self.map.spans() {
            self.data[offset + index] += weight * val;
            index >>= 1;
            weight *= 0.5;
        }
    }

    /// Finalize mean accumulation: divide by the number of completed passes and reset the count.
    /// A no-op for max-mode rows, whose pass count never leaves zero.
    pub fn normalize(&mut self) {
        if self.passes > 1 {
            let scale = 1.0 / self.passes as f32;
            for v in &mut self.data {
                *v *= scale;
            }
        }
        self.passes = 0;
    }

    /// Rebuild every level above 0 by averaging, from finished level 0 data.
    pub fn rescale_mean(&mut self) {
        self.rescale(|a, b| 0.5 * (a + b));
    }

    /// Rebuild every level above 0 by max-hold, from finished level 0 data.
    pub fn rescale_max(&mut self) {
        self.rescale(f32::max);
    }

    fn rescale(&mut self, combine: impl Fn(f32, f32) -> f32) {
        for level in 1..self.map.levels() {
            let (prev_offset, prev_width) = self.map.span(level - 1);
            let (offset, width) = self.map.span(level);
            for j in 0..width {
                let left = self.data[prev_offset + 2 * j];
                let right = if 2 * j + 1 < prev_width {
                    self.data[prev_offset + 2 * j + 1]
                } else {
                    left
                };
                self.data[offset + j] = combine(left, right);
            }
        }
    }

    /// 1:1 ingest of a finished row whose length equals the base resolution.
    pub fn assign_mean(&mut self, values: &[f32]) -> Result<(), CascadeError> {
        self.assign(values)?;
        self.rescale_mean();
        Ok(())
    }

    /// 1:1 max-hold ingest.
    pub fn assign_max(&mut self, values: &[f32]) -> Result<(), CascadeError> {
        self.assign(values)?;
        self.rescale_max();
        Ok(())
    }

    fn assign(&mut self, values: &[f32]) -> Result<(), CascadeError> {
        if values.is_empty() {
            return Err(CascadeError::EmptyInput);
        }
        let resolution = self.resolution();
        if values.len() != resolution {
            return Err(CascadeError::SizeMismatch {
                expected: resolution,
                got: values.len(),
            });
        }
        self.data[..resolution].copy_from_slice(values);
        self.passes = 0;
        Ok(())
    }

    /// Ingest an over-length row, averaging each source window into one base bin.
    pub fn reduce_mean(&mut self, values: &[f32]) -> Result<(), CascadeError> {
        self.reduce(values, |window| {
            window.iter().sum::<f32>() / window.len() as f32
        })?;
        self.rescale_mean();
        Ok(())
    }

    /// Ingest an over-length row, max-holding each source window into one base bin.
    pub fn reduce_max(&mut self, values: &[f32]) -> Result<(), CascadeError> {
        self.reduce(values, |window| {
            window.iter().copied().fold(f32::MIN, f32::max)
        })?;
        self.rescale_max();
        Ok(())
    }

    fn reduce(
        &mut self,
        values: &[f32],
        collapse: impl Fn(&[f32]) -> f32,
    ) -> Result<(), CascadeError> {
        if values.is_empty() {
            return Err(CascadeError::EmptyInput);
        }
        let resolution = self.resolution();
        if values.len() <= resolution {
            return Err(CascadeError::SizeMismatch {
                expected: resolution,
                got: values.len(),
            });
        }
        for j in 0..resolution {
            let start = j * values.len() / resolution;
            let end = (j + 1) * values.len() / resolution;
            self.data[j] = collapse(&values[start..end]);
        }
        self.passes = 0;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const TOLERANCE: f32 = 1e-6;

    #[test]
    fn test_allocation_round_trip() {
        for r in [1, 2, 3, 7, 8, 64, 1000, 4096, 8192] {
            assert_eq!(resolution_for(allocation_for(r)), r);
        }
    }

    #[test]
    fn test_level_map_spans() {
        let map = LevelMap::new(8).unwrap();
        assert_eq!(map.levels(), 4);
        assert_eq!(map.spans(), &[(0, 8), (8, 4), (12, 2), (14, 1)]);

        // Allocation bound holds for non-powers of two as well.
        for r in [1, 3, 5, 100, 1000] {
            let map = LevelMap::new(r).unwrap();
            let total: usize = map.spans().iter().map(|&(_, w)| w).sum();
            assert!(total <= allocation_for(r));
            assert_eq!(map.levels(), r.ilog2() as usize + 1);
        }
    }

    #[test]
    fn test_zero_resolution_rejected() {
        assert_eq!(LevelMap::new(0), Err(CascadeError::InvalidResolution));
        assert!(PyramidLine::new(0).is_err());
        let mut line = PyramidLine::new(8).unwrap();
        assert_eq!(
            line.set_resolution(0),
            Err(CascadeError::InvalidResolution)
        );
        // Rejected, not partially applied.
        assert_eq!(line.resolution(), 8);
    }

    #[test]
    fn test_max_pyramid_incremental() {
        let mut line = PyramidLine::new(8).unwrap();
        for (i, v) in [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
            .iter()
            .enumerate()
        {
            line.set_value_max(i, *v);
        }
        assert_eq!(line.level(0), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(line.level(1), &[2.0, 4.0, 6.0, 8.0]);
        assert_eq!(line.level(2), &[4.0, 8.0]);
        assert_eq!(line.level(3), &[8.0]);
    }

    #[test]
    fn test_max_pyramid_windows() {
        // Out-of-order single sets still produce windowed maxima at every level.
        let values: Vec<f32> = (0..64).map(|i| ((i * 37) % 64) as f32).collect();
        let mut line = PyramidLine::new(64).unwrap();
        for i in (0..64).rev() {
            line.set_value_max(i, values[i]);
        }
        for k in 0..line.levels() {
            let window = 1 << k;
            for (j, &got) in line.level(k).iter().enumerate() {
                let expect = values[j * window..(j + 1) * window]
                    .iter()
                    .copied()
                    .fold(f32::MIN, f32::max);
                assert_eq!(got, expect, "level {} position {}", k, j);
            }
        }
    }

    #[test]
    fn test_mean_pyramid_single_pass() {
        let values = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let mut line = PyramidLine::new(8).unwrap();
        for (i, v) in values.iter().enumerate() {
            line.set_value_mean(i, *v);
        }
        line.normalize();
        for k in 0..line.levels() {
            let window = 1 << k;
            for (j, &got) in line.level(k).iter().enumerate() {
                let expect =
                    values[j * window..(j + 1) * window].iter().sum::<f32>() / window as f32;
                assert!(
                    (got - expect).abs() < TOLERANCE,
                    "level {} position {}: got {}, expected {}",
                    k,
                    j,
                    got,
                    expect
                );
            }
        }
    }

    #[test]
    fn test_mean_pyramid_accumulated_passes() {
        // Three passes of the same row must normalize back to the single-pass means.
        let values = [4.0f32, 8.0, 2.0, 6.0];
        let mut line = PyramidLine::new(4).unwrap();
        for _ in 0..3 {
            for (i, v) in values.iter().enumerate() {
                line.set_value_mean(i, *v);
            }
        }
        line.normalize();
        assert_eq!(line.level(0), &values);
        assert!((line.level(1)[0] - 6.0).abs() < TOLERANCE);
        assert!((line.level(1)[1] - 4.0).abs() < TOLERANCE);
        assert!((line.level(2)[0] - 5.0).abs() < TOLERANCE);
    }

    #[test]
    fn test_normalize_noop_on_max_rows() {
        let mut line = PyramidLine::new(4).unwrap();
        line.assign_max(&[1.0, 3.0, 2.0, 4.0]).unwrap();
        let before = line.as_slice().to_vec();
        line.normalize();
        assert_eq!(line.as_slice(), &before[..]);
    }

    #[test]
    fn test_assign_and_rescale() {
        let values = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let mut mean = PyramidLine::new(8).unwrap();
        mean.assign_mean(&values).unwrap();
        assert_eq!(mean.level(1), &[1.5, 3.5, 5.5, 7.5]);
        assert_eq!(mean.level(3), &[4.5]);

        let mut max = PyramidLine::new(8).unwrap();
        max.assign_max(&values).unwrap();
        assert_eq!(max.level(1), &[2.0, 4.0, 6.0, 8.0]);
        assert_eq!(max.level(3), &[8.0]);
    }

    #[test]
    fn test_assign_size_mismatch() {
        let mut line = PyramidLine::new(8).unwrap();
        assert_eq!(
            line.assign_mean(&[1.0; 4]),
            Err(CascadeError::SizeMismatch {
                expected: 8,
                got: 4
            })
        );
        assert_eq!(line.assign_max(&[]), Err(CascadeError::EmptyInput));
        // No partial mutation on rejection.
        assert!(line.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_reduce_collapses_windows() {
        // 16 source samples into 4 base bins.
        let values: Vec<f32> = (1..=16).map(|v| v as f32).collect();
        let mut mean = PyramidLine::new(4).unwrap();
        mean.reduce_mean(&values).unwrap();
        assert_eq!(mean.level(0), &[2.5, 6.5, 10.5, 14.5]);

        let mut max = PyramidLine::new(4).unwrap();
        max.reduce_max(&values).unwrap();
        assert_eq!(max.level(0), &[4.0, 8.0, 12.0, 16.0]);
        assert_eq!(max.level(2), &[16.0]);
    }

    #[test]
    fn test_reduce_uneven_ratio() {
        // 10 into 4: windows of 2 and 3 samples, every source sample lands in exactly one bin.
        let values: Vec<f32> = (0..10).map(|v| v as f32).collect();
        let mut max = PyramidLine::new(4).unwrap();
        max.reduce_max(&values).unwrap();
        assert_eq!(max.level(0), &[1.0, 4.0, 6.0, 9.0]);
    }

    #[test]
    fn test_reduce_rejects_short_input() {
        let mut line = PyramidLine::new(8).unwrap();
        assert!(line.reduce_mean(&[1.0; 8]).is_err());
        assert!(line.reduce_max(&[1.0; 3]).is_err());
        assert_eq!(line.reduce_mean(&[]), Err(CascadeError::EmptyInput));
    }

    #[test]
    fn test_set_resolution_reuses_allocation() {
        let mut line = PyramidLine::new(64).unwrap();
        line.set_value_max(10, 5.0);
        line.set_resolution(64).unwrap();
        assert!(line.as_slice().iter().all(|&v| v == 0.0));

        line.set_resolution(16).unwrap();
        assert_eq!(line.resolution(), 16);
        assert_eq!(line.allocation(), 32);
        assert_eq!(line.levels(), 5);
    }
}
