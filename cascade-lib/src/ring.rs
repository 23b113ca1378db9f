// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Ring addressing
//!
//! The device keeps the most recent `row_count` rows in a fixed circular grid.  Logical row `t`
//! lives in physical slot `t % row_count`; when the cursor wraps, the oldest row is simply
//! overwritten.  The [`RowStore`] trait is the seam between this bookkeeping and the actual
//! storage, so the wraparound behavior is tested here against a plain `Vec` and the visualizer
//! implements the same trait over a persistently mapped device buffer.

/// Write cursor over a circular row grid.
#[derive(Clone, Debug)]
pub struct RingCursor {
    row: usize,
    row_count: usize,
}

impl RingCursor {
    pub fn new(row_count: usize) -> Self {
        assert!(row_count > 0, "ring must hold at least one row");
        RingCursor { row: 0, row_count }
    }

    /// Physical slot of logical row `t`.
    pub fn slot_of(&self, t: usize) -> usize {
        t % self.row_count
    }

    /// Slot to write next.  Advances circularly.
    pub fn advance(&mut self) -> usize {
        let slot = self.row;
        self.row = (self.row + 1) % self.row_count;
        slot
    }

    pub fn position(&self) -> usize {
        self.row
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn reset(&mut self) {
        self.row = 0;
    }
}

/// Destination for flushed rows.  One slot holds one full row allocation (all pyramid levels).
pub trait RowStore {
    /// Columns per row slot.  Rows longer than this are truncated at the hardware cap; shorter
    /// rows zero-fill the tail.
    fn row_size(&self) -> usize;

    fn write_row(&mut self, slot: usize, row: &[f32]);

    /// Clear every slot back to the empty value.
    fn clear(&mut self);
}

/// Heap-backed store.  Used by tests and the still-image export path.
pub struct VecStore {
    data: Vec<f32>,
    row_size: usize,
}

impl VecStore {
    pub fn new(row_count: usize, row_size: usize) -> Self {
        VecStore {
            data: vec![0.0; row_count * row_size],
            row_size,
        }
    }

    pub fn row(&self, slot: usize) -> &[f32] {
        &self.data[slot * self.row_size..(slot + 1) * self.row_size]
    }
}

impl RowStore for VecStore {
    fn row_size(&self) -> usize {
        self.row_size
    }

    fn write_row(&mut self, slot: usize, row: &[f32]) {
        let dst = &mut self.data[slot * self.row_size..(slot + 1) * self.row_size];
        let n = row.len().min(dst.len());
        dst[..n].copy_from_slice(&row[..n]);
        dst[n..].fill(0.0);
    }

    fn clear(&mut self) {
        self.data.fill(0.0);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_cursor_wraps() {
        let mut cursor = RingCursor::new(4);
        let slots: Vec<usize> = (0..9).map(|_| cursor.advance()).collect();
        assert_eq!(slots, &[0, 1, 2, 3, 0, 1, 2, 3, 0]);
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.slot_of(7), 3);
    }

    #[test]
    fn test_reset() {
        let mut cursor = RingCursor::new(3);
        cursor.advance();
        cursor.advance();
        cursor.reset();
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.advance(), 0);
    }

    #[test]
    fn test_overwrite_after_full_lap() {
        // Five distinct rows into a four-row ring: slot 0 must end up holding the fifth row and
        // the cursor must sit at 1.
        let mut cursor = RingCursor::new(4);
        let mut store = VecStore::new(4, 4);
        for t in 0..5 {
            let row = [t as f32; 4];
            let slot = cursor.advance();
            store.write_row(slot, &row);
        }
        assert_eq!(store.row(0), &[4.0, 4.0, 4.0, 4.0]);
        assert_eq!(store.row(1), &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn test_write_truncates_and_pads() {
        let mut store = VecStore::new(1, 4);
        store.write_row(0, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(store.row(0), &[1.0, 2.0, 3.0, 4.0]);
        store.write_row(0, &[9.0]);
        assert_eq!(store.row(0), &[9.0, 0.0, 0.0, 0.0]);
    }
}
