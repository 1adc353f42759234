// Copyright (c) 2026 kalwalt and AR.js-org contributors
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT
// See https://github.com/AR-js-org/aruco-rs/blob/main/LICENSE
// src/cv/mod.rs

use crate::{ImageBuffer, MarkerCorners};

/// Polarity of a binary threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
    /// `> threshold` becomes 255, the rest 0.
    Binary,
    /// `<= threshold` becomes 255, the rest 0. Dark ink turns into foreground.
    BinaryInv,
}

/// Common trait for the image operations the detector is built on.
/// Lets the pipeline run over interchangeable backends (and test doubles).
pub trait ComputerVision {
    /// Converts an interleaved buffer to grayscale. Three or more channels are
    /// read as RGB(A); one or two as grey (plus alpha).
    ///
    /// # Arguments
    /// * `src` - The source `ImageBuffer`; `src.channels` gives the pixel stride.
    /// * `dst` - The destination buffer, one byte per pixel. Must be pre-allocated.
    fn grayscale(src: &ImageBuffer, dst: &mut [u8]);

    /// Applies a fixed binary threshold to a grayscale image.
    ///
    /// # Arguments
    /// * `src` - The source slice of grayscale pixels.
    /// * `dst` - The destination slice where binary pixels will be written.
    /// * `threshold` - The cutoff (0-255).
    /// * `mode` - Which side of the cutoff becomes 255.
    fn threshold(src: &[u8], dst: &mut [u8], threshold: u8, mode: ThresholdMode);

    /// Computes the Otsu threshold for a grayscale image.
    ///
    /// # Returns
    /// The level maximizing between-class variance (0-255).
    fn otsu(src: &[u8]) -> u8;

    /// Extracts a square patch using a perspective transform and bilinear interpolation.
    ///
    /// # Arguments
    /// * `src` - The source grayscale `ImageBuffer`.
    /// * `dst` - The destination buffer, `warp_size * warp_size` bytes.
    /// * `corners` - The quadrilateral mapped onto the patch corners, in order
    ///   top-left, top-right, bottom-right, bottom-left of the patch.
    /// * `warp_size` - The side of the output square.
    fn warp(src: &ImageBuffer, dst: &mut [u8], corners: &MarkerCorners, warp_size: usize);

    /// Counts non-zero pixels within a rectangular region.
    fn count_non_zero(src: &ImageBuffer, square: &Square) -> usize;
}

/// Defines a rectangular region of interest
#[derive(Debug, Clone, Copy)]
pub struct Square {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

// Submodules for specific CV algorithms
pub mod contours;
pub mod geometry;
pub mod scalar;
