// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Synthetic spectrum source
//!
//! Generates plausible dBFS spectrum rows so the waterfall can run without a radio or audio
//! backend attached: a noisy floor plus a few narrowband carriers that wander and fade.

use rand::Rng;

const NOISE_FLOOR_DB: f32 = -95.0;
const CARRIERS: usize = 4;

struct Carrier {
    /// Normalized center frequency.
    center: f32,
    /// Drift per row, normalized.
    velocity: f32,
    /// Peak level in dBFS.
    level: f32,
    /// Half-width in bins.
    spread: f32,
}

pub struct SweepSource {
    resolution: usize,
    carriers: Vec<Carrier>,
    row: Vec<f32>,
}

impl SweepSource {
    pub fn new(resolution: usize) -> Self {
        let mut rng = rand::rng();
        let carriers = (0..CARRIERS)
            .map(|_| Carrier {
                center: rng.random_range(0.05..0.95),
                velocity: rng.random_range(-2e-4..2e-4),
                level: rng.random_range(-60.0..-20.0),
                spread: rng.random_range(1.5..6.0),
            })
            .collect();

        SweepSource {
            resolution,
            carriers,
            row: vec![0.0; resolution],
        }
    }

    /// Produce the next row of dBFS magnitudes.
    pub fn next_row(&mut self) -> &[f32] {
        let mut rng = rand::rng();

        for bin in self.row.iter_mut() {
            *bin = NOISE_FLOOR_DB + rng.random_range(0.0..6.0);
        }

        let resolution = self.resolution as f32;
        for carrier in &mut self.carriers {
            carrier.center += carrier.velocity;
            if !(0.02..=0.98).contains(&carrier.center) {
                carrier.velocity = -carrier.velocity;
                carrier.center = carrier.center.clamp(0.02, 0.98);
            }
            carrier.level += rng.random_range(-0.5..0.5);
            carrier.level = carrier.level.clamp(-70.0, -10.0);

            let peak_bin = carrier.center * resolution;
            let reach = (carrier.spread * 4.0).ceil() as isize;
            let base = peak_bin as isize;
            for offset in -reach..=reach {
                let bin = base + offset;
                if bin < 0 || bin >= self.resolution as isize {
                    continue;
                }
                let distance = (bin as f32 - peak_bin) / carrier.spread;
                let db = carrier.level - 3.0 * distance * distance;
                let slot = &mut self.row[bin as usize];
                if db > *slot {
                    *slot = db;
                }
            }
        }

        &self.row
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_rows_have_requested_length() {
        let mut source = SweepSource::new(512);
        for _ in 0..10 {
            assert_eq!(source.next_row().len(), 512);
        }
    }

    #[test]
    fn test_rows_stay_in_dbfs_range() {
        let mut source = SweepSource::new(256);
        for _ in 0..50 {
            for &db in source.next_row() {
                assert!(db <= 0.0 && db >= -120.0, "implausible level {}", db);
            }
        }
    }
}
