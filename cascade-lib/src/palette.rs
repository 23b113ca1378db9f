// Copyright 2026 The Cascade Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Palette
//!
//! Small color lookup table indexed by normalized intensity.  The table lives on the CPU side
//! behind a dirty flag; the renderer re-uploads it only when something actually changed, never
//! per frame.

use palette::{LinSrgb, Mix, Srgb};
use rgb::RGBA8;

pub const PALETTE_SIZE: usize = 256;

pub struct Palette {
    colors: Vec<RGBA8>,
    dirty: bool,
}

impl Palette {
    /// Replace the table.  Inputs of any non-zero length are resampled to the fixed size.
    /// Empty input is ignored.
    pub fn set(&mut self, colors: &[RGBA8]) {
        if colors.is_empty() {
            return;
        }
        for i in 0..PALETTE_SIZE {
            let src = i * colors.len() / PALETTE_SIZE;
            self.colors[i] = colors[src.min(colors.len() - 1)];
        }
        self.dirty = true;
    }

    pub fn colors(&self) -> &[RGBA8] {
        &self.colors
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Consume the dirty flag.  Returns whether an upload is due.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

impl Default for Palette {
    /// Dark blue through cyan and yellow up to white, interpolated in linear light.
    fn default() -> Self {
        let stops: [LinSrgb; 5] = [
            Srgb::new(0.0f32, 0.0, 0.05).into_linear(),
            Srgb::new(0.0f32, 0.1, 0.5).into_linear(),
            Srgb::new(0.0f32, 0.8, 0.9).into_linear(),
            Srgb::new(1.0f32, 0.9, 0.1).into_linear(),
            Srgb::new(1.0f32, 1.0, 1.0).into_linear(),
        ];

        let colors = (0..PALETTE_SIZE)
            .map(|i| {
                let t = i as f32 / (PALETTE_SIZE - 1) as f32;
                let scaled = t * (stops.len() - 1) as f32;
                let seg = (scaled as usize).min(stops.len() - 2);
                let mixed = stops[seg].mix(stops[seg + 1], scaled - seg as f32);
                let out: Srgb<u8> = Srgb::from_linear(mixed);
                RGBA8 {
                    r: out.red,
                    g: out.green,
                    b: out.blue,
                    a: 255,
                }
            })
            .collect();

        Palette {
            colors,
            // A fresh palette has never been uploaded.
            dirty: true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_ramp() {
        let palette = Palette::default();
        assert_eq!(palette.colors().len(), PALETTE_SIZE);
        assert!(palette.is_dirty());

        let first = palette.colors()[0];
        let last = palette.colors()[PALETTE_SIZE - 1];
        // Dark at the bottom, white at the top.
        assert!(first.r == 0 && first.g == 0);
        assert_eq!((last.r, last.g, last.b), (255, 255, 255));
    }

    #[test]
    fn test_dirty_gates_upload() {
        let mut palette = Palette::default();
        assert!(palette.take_dirty());
        assert!(!palette.take_dirty());

        palette.set(&[RGBA8::new(255, 0, 0, 255)]);
        assert!(palette.take_dirty());
        assert!(!palette.take_dirty());
    }

    #[test]
    fn test_set_resamples() {
        let mut palette = Palette::default();
        let two = [RGBA8::new(10, 0, 0, 255), RGBA8::new(0, 20, 0, 255)];
        palette.set(&two);
        assert_eq!(palette.colors()[0], two[0]);
        assert_eq!(palette.colors()[127], two[0]);
        assert_eq!(palette.colors()[128], two[1]);
        assert_eq!(palette.colors()[255], two[1]);
    }

    #[test]
    fn test_empty_set_ignored() {
        let mut palette = Palette::default();
        palette.take_dirty();
        let before = palette.colors().to_vec();
        palette.set(&[]);
        assert!(!palette.is_dirty());
        assert_eq!(palette.colors(), &before[..]);
    }
}
