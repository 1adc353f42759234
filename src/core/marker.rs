// Copyright (c) 2026 kalwalt and AR.js-org contributors
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT
// See https://github.com/AR-js-org/aruco-rs/blob/main/LICENSE
// src/core/marker.rs

//! Marker value type and the 5x5 identity codec.
//!
//! A marker is a 7x7 grid of cells: a black outer ring and a 5x5 payload.
//! Every payload row must be one of the four [`CODEBOOK`] words; columns 1
//! and 3 of each row carry two information bits, the other three detect
//! errors. Five rows give 10 bits, i.e. ids `0..=1023`.

use std::cmp::Ordering;
use std::fmt;

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::{MarkerCorners, MarkerError, Result, Transformation};

/// Cells per side of a full marker, border included.
pub const MARKER_CELLS: usize = 7;

/// Cells per side of the payload.
pub const BIT_CELLS: usize = 5;

/// Largest encodable id.
pub const MAX_MARKER_ID: u16 = 1023;

/// Payload grid, `matrix[row][col]`, 1 = white cell.
pub type BitMatrix = [[u8; BIT_CELLS]; BIT_CELLS];

/// Valid row words, indexed by the 2-bit value they encode.
pub const CODEBOOK: [[u8; BIT_CELLS]; 4] = [
    [1, 0, 0, 0, 0],
    [1, 0, 1, 1, 1],
    [0, 1, 0, 0, 1],
    [0, 1, 1, 1, 0],
];

/// A decoded marker found in one frame.
///
/// # Fields
/// * `id` - The decoded payload in `0..=1023`.
/// * `corners` - Image corners, clockwise, `corners[0]` being the tag's own top-left.
/// * `rotations` - Clockwise quarter turns applied to the sampled grid to reach the canonical orientation.
/// * `transformation` - Marker-to-camera pose `[R | t]`; identity until pose estimation runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: u16,
    pub corners: MarkerCorners,
    pub rotations: u8,
    pub transformation: Transformation,
}

impl Marker {
    pub fn new(id: u16, corners: MarkerCorners, rotations: u8) -> Self {
        Self {
            id,
            corners,
            rotations,
            transformation: Transformation::identity(),
        }
    }

    /// Ordering by id, used to make detector output deterministic.
    pub fn cmp_id(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }

    /// Draws the marker outline onto `image`.
    pub fn draw_outline(&self, image: &mut RgbImage, color: Rgb<u8>) {
        for i in 0..4 {
            let a = self.corners[i];
            let b = self.corners[(i + 1) % 4];
            draw_line_segment_mut(image, (a.x, a.y), (b.x, b.y), color);
        }
    }
}

impl fmt::Display for Marker {
    /// `id 300 rot 0 [(100, 60) (169, 60) (169, 129) (100, 129)]`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id {} rot {} [", self.id, self.rotations)?;
        for (i, c) in self.corners.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "({}, {})", c.x, c.y)?;
        }
        f.write_str("]")
    }
}

/// Rotates a grid 90 degrees clockwise: `dst[r][c] = src[n - 1 - c][r]`.
pub fn rotate_bit_matrix(src: &BitMatrix) -> BitMatrix {
    let mut dst = [[0u8; BIT_CELLS]; BIT_CELLS];
    for (r, row) in dst.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = src[BIT_CELLS - 1 - c][r];
        }
    }
    dst
}

/// Sum over rows of the Hamming distance to the nearest codeword.
pub fn hamming_distance_to_codebook(bits: &BitMatrix) -> u32 {
    bits.iter()
        .map(|row| {
            CODEBOOK
                .iter()
                .map(|word| row.iter().zip(word).filter(|(a, b)| a != b).count() as u32)
                .min()
                .unwrap_or(0)
        })
        .sum()
}

/// Packs columns 1 and 3 of every row, first row most significant.
pub fn bits_to_id(bits: &BitMatrix) -> u16 {
    bits.iter().fold(0u16, |id, row| {
        let id = (id << 1) | u16::from(row[1] != 0);
        (id << 1) | u16::from(row[3] != 0)
    })
}

/// Builds the payload grid for `id`, or `None` when it does not fit in 10 bits.
pub fn encode_id(id: u16) -> Option<BitMatrix> {
    if id > MAX_MARKER_ID {
        return None;
    }
    let mut bits = [[0u8; BIT_CELLS]; BIT_CELLS];
    for (r, row) in bits.iter_mut().enumerate() {
        let value = (id >> (2 * (BIT_CELLS - 1 - r))) & 0b11;
        *row = CODEBOOK[value as usize];
    }
    Some(bits)
}

/// Identifies a sampled grid.
///
/// Tries the grid and its three clockwise rotations, keeps the first one with
/// the lowest codebook distance and accepts it only at distance zero.
/// Returns the id and the number of rotations that produced it.
pub fn decode_id(bits: &BitMatrix) -> Result<(u16, u8)> {
    let mut current = *bits;
    let mut best = (hamming_distance_to_codebook(&current), 0u8, current);

    for rotation in 1..4u8 {
        current = rotate_bit_matrix(&current);
        let distance = hamming_distance_to_codebook(&current);
        if distance < best.0 {
            best = (distance, rotation, current);
        }
    }

    match best {
        (0, rotation, grid) => Ok((bits_to_id(&grid), rotation)),
        _ => Err(MarkerError::NotAMarker),
    }
}

/// Renders a printable marker: black border ring, white payload cells where the bit is set.
/// The grid is drawn as given; legality is the caller's concern.
pub fn generate_encoded_image(cell_size: u32, bits: &BitMatrix) -> RgbImage {
    let side = cell_size * MARKER_CELLS as u32;
    RgbImage::from_fn(side, side, |x, y| {
        let cx = (x / cell_size) as usize;
        let cy = (y / cell_size) as usize;
        let inner = (1..=BIT_CELLS).contains(&cx) && (1..=BIT_CELLS).contains(&cy);
        if inner && bits[cy - 1][cx - 1] != 0 {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    })
}
