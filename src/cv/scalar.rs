// Copyright (c) 2026 kalwalt and AR.js-org contributors
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT
// See https://github.com/AR-js-org/aruco-rs/blob/main/LICENSE
// src/cv/scalar.rs

use nalgebra::Vector3;

use crate::cv::geometry::square_to_quad;
use crate::cv::{ComputerVision, Square, ThresholdMode};
use crate::{ImageBuffer, MarkerCorners};

/// Scalar implementation of the detector's image operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarCV;

impl ComputerVision for ScalarCV {
    /// Weighted average: 0.299R + 0.587G + 0.114B. Grey and grey-alpha input
    /// keeps its first sample.
    fn grayscale(src: &ImageBuffer, dst: &mut [u8]) {
        let stride = src.channels.max(1) as usize;
        if stride < 3 {
            for (px, out) in src.data.chunks_exact(stride).zip(dst.iter_mut()) {
                *out = px[0];
            }
            return;
        }

        for (px, out) in src.data.chunks_exact(stride).zip(dst.iter_mut()) {
            let r = px[0] as f32;
            let g = px[1] as f32;
            let b = px[2] as f32;
            *out = ((r * 0.299 + g * 0.587 + b * 0.114 + 0.5) as u32).min(255) as u8;
        }
    }

    fn threshold(src: &[u8], dst: &mut [u8], threshold: u8, mode: ThresholdMode) {
        let mut tab = [0u8; 256];

        // Build lookup table
        for (i, entry) in tab.iter_mut().enumerate() {
            let above = i > threshold as usize;
            *entry = match (mode, above) {
                (ThresholdMode::Binary, true) | (ThresholdMode::BinaryInv, false) => 255,
                _ => 0,
            };
        }

        for (out, &pixel) in dst.iter_mut().zip(src) {
            *out = tab[pixel as usize];
        }
    }

    fn otsu(src: &[u8]) -> u8 {
        let len = src.len() as f64;
        let mut hist = [0u32; 256];
        for &pixel in src {
            hist[pixel as usize] += 1;
        }

        let sum: f64 = hist
            .iter()
            .enumerate()
            .map(|(i, &h)| h as f64 * i as f64)
            .sum();

        let mut threshold = 0;
        let mut sum_b = 0.0;
        let mut w_b = 0.0;
        let mut max = 0.0;

        for (i, &h) in hist.iter().enumerate() {
            w_b += h as f64;
            if w_b == 0.0 {
                continue;
            }
            let w_f = len - w_b;
            if w_f == 0.0 {
                break;
            }

            sum_b += h as f64 * i as f64;
            let mu = sum_b / w_b - (sum - sum_b) / w_f;
            let between = w_b * w_f * mu * mu;
            if between > max {
                max = between;
                threshold = i as u8;
            }
        }

        threshold
    }

    /// Patch pixel `(col, row)` samples the source at `H * (col, row, 1)`, where
    /// `H` sends the patch corners onto `corners`.
    fn warp(src: &ImageBuffer, dst: &mut [u8], corners: &MarkerCorners, warp_size: usize) {
        let width = src.width as usize;
        let height = src.height as usize;
        if width == 0 || height == 0 || warp_size < 2 {
            dst.iter_mut().for_each(|p| *p = 0);
            return;
        }

        let h = square_to_quad(corners, (warp_size - 1) as f64);
        let max_x = (width - 1) as f64;
        let max_y = (height - 1) as f64;

        for (row, line) in dst.chunks_exact_mut(warp_size).take(warp_size).enumerate() {
            for (col, out) in line.iter_mut().enumerate() {
                let p = h * Vector3::new(col as f64, row as f64, 1.0);
                let (x, y) = if p.z.abs() > f64::EPSILON {
                    ((p.x / p.z).clamp(0.0, max_x), (p.y / p.z).clamp(0.0, max_y))
                } else {
                    (0.0, 0.0)
                };

                let sx1 = x as usize;
                let sy1 = y as usize;
                let sx2 = (sx1 + 1).min(width - 1);
                let sy2 = (sy1 + 1).min(height - 1);
                let dx = x - sx1 as f64;
                let dy = y - sy1 as f64;

                let at = |sx: usize, sy: usize| src.data[sy * width + sx] as f64;
                let val = (1.0 - dy) * ((1.0 - dx) * at(sx1, sy1) + dx * at(sx2, sy1))
                    + dy * ((1.0 - dx) * at(sx1, sy2) + dx * at(sx2, sy2));

                *out = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    fn count_non_zero(src: &ImageBuffer, square: &Square) -> usize {
        let width = src.width as usize;
        let x0 = square.x as usize;
        let x1 = (x0 + square.width as usize).min(width);
        let y0 = square.y as usize;
        let y1 = (y0 + square.height as usize).min(src.height as usize);
        if x0 >= x1 {
            return 0;
        }

        (y0..y1)
            .map(|y| {
                src.data[y * width + x0..y * width + x1]
                    .iter()
                    .filter(|&&p| p != 0)
                    .count()
            })
            .sum()
    }
}
