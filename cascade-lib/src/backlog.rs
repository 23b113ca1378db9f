// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Line pool and backlog
//!
//! Real-time ingest must not churn the allocator.  Finished rows wait in a bounded FIFO backlog
//! until the paint cycle flushes them into the device ring; rows leaving the backlog hand their
//! buffer back to a pool that the next push checks out from.  A line is owned by exactly one of
//! {pool, backlog, caller} at any moment; transfers are moves, so the type system already rules
//! out a line appearing in two containers.

use std::collections::VecDeque;

use crate::line::PyramidLine;
use crate::ring::{RingCursor, RowStore};
use crate::CascadeError;

/// Which reduction family builds pushed rows.  Switching never reprocesses stored rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Blending {
    Mean,
    Max,
}

/// Checkout/return pool of retired line buffers.
pub struct LinePool {
    free: Vec<PyramidLine>,
    capacity: usize,
}

impl LinePool {
    pub fn new(capacity: usize) -> Self {
        LinePool {
            free: Vec::new(),
            capacity,
        }
    }

    /// Obtain a zeroed line for `resolution`, reusing a retired buffer when one with a matching
    /// allocation exists.
    pub fn checkout(&mut self, resolution: usize) -> Result<PyramidLine, CascadeError> {
        match self.free.pop() {
            Some(mut line) => {
                line.set_resolution(resolution)?;
                Ok(line)
            }
            None => PyramidLine::new(resolution),
        }
    }

    /// Retire a line.  Dropped outright once the pool is full.
    pub fn checkin(&mut self, line: PyramidLine) {
        if self.free.len() < self.capacity {
            self.free.push(line);
        }
    }

    /// Release buffers above `target`.  Invoked on resolution changes so stale allocations are
    /// not retained indefinitely.
    pub fn shrink(&mut self, target: usize) {
        self.free.truncate(target);
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Time-ordered rows awaiting transfer to the device ring, plus the recycling pool.
pub struct Backlog {
    pool: LinePool,
    history: VecDeque<PyramidLine>,
    history_capacity: usize,
    resolution: usize,
    blending: Blending,
}

impl Backlog {
    pub fn new(
        resolution: usize,
        history_capacity: usize,
        pool_capacity: usize,
    ) -> Result<Self, CascadeError> {
        if resolution == 0 {
            return Err(CascadeError::InvalidResolution);
        }
        Ok(Backlog {
            pool: LinePool::new(pool_capacity),
            history: VecDeque::new(),
            history_capacity,
            resolution,
            blending: Blending::Mean,
        })
    }

    pub fn blending(&self) -> Blending {
        self.blending
    }

    pub fn set_blending(&mut self, blending: Blending) {
        self.blending = blending;
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Change the ingest resolution.  Pending rows are discarded into the pool and the pool is
    /// shrunk so stale-sized buffers do not linger.
    pub fn set_resolution(&mut self, resolution: usize) -> Result<(), CascadeError> {
        if resolution == 0 {
            return Err(CascadeError::InvalidResolution);
        }
        self.resolution = resolution;
        while let Some(line) = self.history.pop_front() {
            self.pool.checkin(line);
        }
        self.flush_line_pool(1);
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.history.len()
    }

    /// Total live lines across the pool and the backlog.
    pub fn live_lines(&self) -> usize {
        self.pool.len() + self.history.len()
    }

    /// Ingest one spectrum row.  The resolution-matching path is picked by length: equal lengths
    /// assign 1:1, longer inputs reduce, shorter inputs are rejected without mutation.  When the
    /// backlog is full the oldest row is evicted back into the pool.
    pub fn push_fft_row(&mut self, data: &[f32]) -> Result<(), CascadeError> {
        self.push_fft_row_accumulated(data, 1)
    }

    /// Ingest one spectrum row accumulated `repeats` times through the mean path.  With max
    /// blending repetition is idempotent and this is identical to [`push_fft_row`].
    ///
    /// [`push_fft_row`]: Backlog::push_fft_row
    pub fn push_fft_row_accumulated(
        &mut self,
        data: &[f32],
        repeats: u32,
    ) -> Result<(), CascadeError> {
        if data.is_empty() {
            return Err(CascadeError::EmptyInput);
        }
        if data.len() < self.resolution {
            return Err(CascadeError::SizeMismatch {
                expected: self.resolution,
                got: data.len(),
            });
        }

        let mut line = self.pool.checkout(self.resolution)?;
        let result = self.ingest(&mut line, data, repeats.max(1));
        match result {
            Ok(()) => {
                self.history.push_back(line);
                if self.history.len() > self.history_capacity {
                    if let Some(evicted) = self.history.pop_front() {
                        self.pool.checkin(evicted);
                    }
                }
                Ok(())
            }
            Err(e) => {
                // The checked-out line never entered the backlog; recycle it.
                self.pool.checkin(line);
                Err(e)
            }
        }
    }

    fn ingest(
        &self,
        line: &mut PyramidLine,
        data: &[f32],
        repeats: u32,
    ) -> Result<(), CascadeError> {
        match (self.blending, data.len() == self.resolution) {
            (Blending::Max, true) => line.assign_max(data),
            (Blending::Max, false) => line.reduce_max(data),
            (Blending::Mean, true) if repeats == 1 => line.assign_mean(data),
            (Blending::Mean, true) => {
                for _ in 0..repeats {
                    for (i, v) in data.iter().enumerate() {
                        line.set_value_mean(i, *v);
                    }
                }
                line.normalize();
                Ok(())
            }
            (Blending::Mean, false) => line.reduce_mean(data),
        }
    }

    /// Discard the most recently pushed row without flushing it.
    pub fn dispose_last_line(&mut self) -> Result<(), CascadeError> {
        let line = self
            .history
            .pop_back()
            .ok_or(CascadeError::NothingPending)?;
        self.pool.checkin(line);
        Ok(())
    }

    /// Move the oldest pending row into the next ring slot and recycle its buffer.
    pub fn flush_one_line(
        &mut self,
        store: &mut impl RowStore,
        cursor: &mut RingCursor,
    ) -> Result<(), CascadeError> {
        let line = self
            .history
            .pop_front()
            .ok_or(CascadeError::NothingPending)?;
        let slot = cursor.advance();
        store.write_row(slot, line.as_slice());
        self.pool.checkin(line);
        Ok(())
    }

    /// Flush every pending row, one slot at a time.
    pub fn flush_lines(&mut self, store: &mut impl RowStore, cursor: &mut RingCursor) {
        while self.flush_one_line(store, cursor).is_ok() {}
    }

    /// Flush every pending row in one batch.  Same semantics as [`flush_lines`]; the split
    /// exists so a device-backed store can coalesce the flush into a single range.
    ///
    /// [`flush_lines`]: Backlog::flush_lines
    pub fn flush_lines_bulk(&mut self, store: &mut impl RowStore, cursor: &mut RingCursor) {
        self.flush_lines(store, cursor);
    }

    /// Shrink the pool to `target` retired buffers (the original's `flushLinePool`).
    pub fn flush_line_pool(&mut self, target: usize) {
        self.pool.shrink(target);
    }

    /// Drop all pending rows back into the pool.
    pub fn clear(&mut self) {
        while let Some(line) = self.history.pop_front() {
            self.pool.checkin(line);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ring::VecStore;

    #[test]
    fn test_pool_reuses_buffers() {
        let mut pool = LinePool::new(4);
        let line = pool.checkout(8).unwrap();
        let ptr = line.as_slice().as_ptr();
        pool.checkin(line);
        let again = pool.checkout(8).unwrap();
        assert_eq!(again.as_slice().as_ptr(), ptr);
        assert!(again.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_pool_capacity_bound() {
        let mut pool = LinePool::new(2);
        for _ in 0..5 {
            let line = PyramidLine::new(4).unwrap();
            pool.checkin(line);
        }
        assert_eq!(pool.len(), 2);
        pool.shrink(1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_push_selects_path_by_length() {
        let mut backlog = Backlog::new(4, 8, 4).unwrap();
        backlog.set_blending(Blending::Max);
        backlog.push_fft_row(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        let wide: Vec<f32> = (1..=16).map(|v| v as f32).collect();
        backlog.push_fft_row(&wide).unwrap();
        assert_eq!(backlog.pending(), 2);

        assert_eq!(
            backlog.push_fft_row(&[1.0, 2.0]),
            Err(CascadeError::SizeMismatch {
                expected: 4,
                got: 2
            })
        );
        assert_eq!(backlog.push_fft_row(&[]), Err(CascadeError::EmptyInput));
        assert_eq!(backlog.pending(), 2);
    }

    #[test]
    fn test_accumulated_push_normalizes() {
        let mut backlog = Backlog::new(4, 8, 4).unwrap();
        let mut store = VecStore::new(8, 8);
        let mut cursor = RingCursor::new(8);

        backlog
            .push_fft_row_accumulated(&[2.0, 4.0, 6.0, 8.0], 3)
            .unwrap();
        backlog.flush_one_line(&mut store, &mut cursor).unwrap();
        // Level 0 unchanged by accumulation, level 2 apex is the overall mean.
        assert_eq!(&store.row(0)[..4], &[2.0, 4.0, 6.0, 8.0]);
        assert!((store.row(0)[6] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_history_eviction_bounds_live_lines() {
        let row_count = 4;
        let pool_capacity = 3;
        let mut backlog = Backlog::new(2, row_count, pool_capacity).unwrap();
        let mut store = VecStore::new(row_count, 4);
        let mut cursor = RingCursor::new(row_count);

        for t in 0..50 {
            backlog.push_fft_row(&[t as f32, t as f32]).unwrap();
            assert!(backlog.live_lines() <= row_count + pool_capacity + 1);
            if t % 3 == 0 {
                let _ = backlog.flush_one_line(&mut store, &mut cursor);
            }
        }
        backlog.flush_lines_bulk(&mut store, &mut cursor);
        assert_eq!(backlog.pending(), 0);
        assert!(backlog.live_lines() <= row_count + pool_capacity + 1);
    }

    #[test]
    fn test_flush_preserves_order_and_wraps() {
        let row_count = 4;
        let mut backlog = Backlog::new(2, 8, 4).unwrap();
        let mut store = VecStore::new(row_count, 4);
        let mut cursor = RingCursor::new(row_count);

        for t in 1..=5 {
            backlog.push_fft_row(&[t as f32, t as f32]).unwrap();
            backlog.flush_one_line(&mut store, &mut cursor).unwrap();
        }
        // Fifth row overwrote slot 0 on wraparound.
        assert_eq!(store.row(0)[0], 5.0);
        assert_eq!(store.row(1)[0], 2.0);
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn test_dispose_last_line() {
        let mut backlog = Backlog::new(2, 8, 4).unwrap();
        assert_eq!(
            backlog.dispose_last_line(),
            Err(CascadeError::NothingPending)
        );
        backlog.push_fft_row(&[1.0, 1.0]).unwrap();
        backlog.push_fft_row(&[2.0, 2.0]).unwrap();
        backlog.dispose_last_line().unwrap();
        assert_eq!(backlog.pending(), 1);

        let mut store = VecStore::new(4, 4);
        let mut cursor = RingCursor::new(4);
        backlog.flush_one_line(&mut store, &mut cursor).unwrap();
        assert_eq!(store.row(0)[0], 1.0);
    }

    #[test]
    fn test_set_resolution_clears_and_shrinks() {
        let mut backlog = Backlog::new(8, 8, 4).unwrap();
        for _ in 0..4 {
            backlog.push_fft_row(&[0.0; 8]).unwrap();
        }
        backlog.set_resolution(16).unwrap();
        assert_eq!(backlog.pending(), 0);
        assert!(backlog.live_lines() <= 1);
        backlog.push_fft_row(&[1.0; 16]).unwrap();
        assert_eq!(backlog.resolution(), 16);

        assert_eq!(
            backlog.set_resolution(0),
            Err(CascadeError::InvalidResolution)
        );
        assert_eq!(backlog.resolution(), 16);
    }
}
