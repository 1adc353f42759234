// Copyright (c) 2026 kalwalt and AR.js-org contributors
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT
// See https://github.com/AR-js-org/aruco-rs/blob/main/LICENSE
use nalgebra::{Matrix3x4, Vector2};
use thiserror::Error;

/// 2D Point with floating point precision (f32 for pixel coordinates)
pub type Point2f = Vector2<f32>;

/// 2D Point in pixel coordinates
pub type Point2i = Vector2<i32>;

/// The four corners of a detected marker, clockwise as imaged.
pub type MarkerCorners = [Point2f; 4];

/// Rigid transform `[R | t]` mapping marker-local coordinates into camera coordinates.
pub type Transformation = Matrix3x4<f64>;

/// Zero-copy view over an interleaved 8-bit image.
///
/// # Fields
/// * `data` - A slice representing a 1D contiguous array of 8-bit samples.
/// * `width` - The logical width of the frame in pixels.
/// * `height` - The logical height of the frame in pixels.
/// * `channels` - Interleaved samples per pixel (1 for grey, 3 for RGB).
#[derive(Debug, Clone, Copy)]
pub struct ImageBuffer<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl<'a> ImageBuffer<'a> {
    /// Wraps `data`, checking that its length matches the declared geometry.
    pub fn new(data: &'a [u8], width: u32, height: u32, channels: u32) -> Result<Self> {
        let buffer = ImageBuffer {
            data,
            width,
            height,
            channels,
        };
        if channels == 0
            || width == 0
            || height == 0
            || buffer.sample_count() != Some(data.len())
        {
            return Err(buffer.invalid());
        }
        Ok(buffer)
    }

    /// Single-channel view, used for the detector's internal grey and binary planes.
    pub fn gray(data: &'a [u8], width: u32, height: u32) -> Self {
        ImageBuffer {
            data,
            width,
            height,
            channels: 1,
        }
    }

    /// `width * height`, or `None` when it does not fit in `usize`.
    pub fn pixel_count(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.height as usize)
    }

    pub fn sample_count(&self) -> Option<usize> {
        self.pixel_count()?.checked_mul(self.channels as usize)
    }

    pub(crate) fn invalid(&self) -> MarkerError {
        MarkerError::InvalidFrame {
            width: self.width,
            height: self.height,
            channels: self.channels,
            len: self.data.len(),
        }
    }
}

/// Possible errors during detection or pose estimation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarkerError {
    /// The frame view is malformed or not a 3-channel image.
    #[error("invalid frame {width}x{height} with {channels} channel(s) over {len} bytes")]
    InvalidFrame {
        width: u32,
        height: u32,
        channels: u32,
        len: usize,
    },
    /// A candidate failed the border check or matched no codeword at any rotation.
    #[error("candidate is not a marker")]
    NotAMarker,
    /// The pose solve was degenerate or did not reproject onto the observed corners.
    #[error("pose unresolved: {0}")]
    PoseUnresolved(&'static str),
    /// Construction-time parameter validation failed.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
}

pub type Result<T> = std::result::Result<T, MarkerError>;

pub mod camera;
pub mod core;
pub mod cv;
pub mod pose;

pub use crate::camera::{Camera, Distortion};
pub use crate::core::detector::{DetectorParams, MarkerDetector};
pub use crate::core::marker::{BitMatrix, Marker};
pub use crate::pose::PoseEstimator;
