// Copyright (c) 2026 kalwalt and AR.js-org contributors
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT
// See https://github.com/AR-js-org/aruco-rs/blob/main/LICENSE
// src/cv/contours.rs

//! Suzuki-Abe border following over a binary image.
//!
//! The image is copied into a label plane padded by one zero pixel on every
//! side, so neighbour lookups never leave the buffer. Foreground pixels start
//! as 1 and are relabelled with the (signed) border number while tracing.

use crate::{ImageBuffer, Point2i};

/// Offsets for the 8-neighbourhood (x, y), counter-clockwise starting east.
pub const NEIGHBORHOOD: [[i32; 2]; 8] = [
    [1, 0],
    [1, -1],
    [0, -1],
    [-1, -1],
    [-1, 0],
    [-1, 1],
    [0, 1],
    [1, 1],
];

/// A single traced border.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contour {
    /// Border pixels in tracing order.
    pub points: Vec<Point2i>,
    /// Whether this border encloses a hole rather than a foreground component.
    pub hole: bool,
}

/// Fills `labels` with the 0/1 version of `src`, surrounded by a zero frame.
/// `labels` is resized to `(width + 2) * (height + 2)`.
pub fn binary_border(src: &ImageBuffer, labels: &mut Vec<i32>) {
    let width = src.width as usize;
    let height = src.height as usize;
    let stride = width + 2;

    labels.clear();
    labels.resize(stride * (height + 2), 0);

    for (y, row) in src.data.chunks_exact(width).take(height).enumerate() {
        let dst = &mut labels[(y + 1) * stride + 1..(y + 1) * stride + 1 + width];
        for (out, &pixel) in dst.iter_mut().zip(row) {
            *out = i32::from(pixel != 0);
        }
    }
}

/// Flat-index offsets of the 8 neighbours for a row stride, repeated twice so
/// a clockwise sweep can run past index 7 without wrapping.
pub fn neighborhood_deltas(stride: i32) -> [isize; 16] {
    let mut deltas = [0isize; 16];
    for (i, [dx, dy]) in NEIGHBORHOOD.iter().enumerate() {
        let delta = (dx + dy * stride) as isize;
        deltas[i] = delta;
        deltas[i + 8] = delta;
    }
    deltas
}

fn offset(pos: usize, delta: isize) -> usize {
    (pos as isize + delta) as usize
}

/// Traces one border starting at `pos`, labelling it with `nbd`.
///
/// # Arguments
/// * `labels` - Padded label plane; rewritten along the border.
/// * `pos` - Flat index of the starting pixel.
/// * `nbd` - Border number assigned to this trace.
/// * `point` - Unpadded image coordinates of `pos`.
/// * `hole` - True when tracing a hole border.
/// * `deltas` - Output of [`neighborhood_deltas`].
pub fn border_following(
    labels: &mut [i32],
    pos: usize,
    nbd: i32,
    mut point: Point2i,
    hole: bool,
    deltas: &[isize; 16],
) -> Contour {
    let mut contour = Contour {
        points: Vec::new(),
        hole,
    };

    // Search clockwise from the background neighbour that triggered the trace.
    let start_dir: usize = if hole { 0 } else { 4 };
    let mut dir = start_dir;
    let mut first_neighbour;
    loop {
        dir = (dir + 7) & 7;
        first_neighbour = offset(pos, deltas[dir]);
        if labels[first_neighbour] != 0 || dir == start_dir {
            break;
        }
    }

    if dir == start_dir {
        // Isolated pixel.
        labels[pos] = -nbd;
        contour.points.push(point);
        return contour;
    }

    let mut current = pos;
    loop {
        let prev_dir = dir;

        // Counter-clockwise sweep for the next border pixel.
        let mut next;
        loop {
            dir += 1;
            next = offset(current, deltas[dir]);
            if labels[next] != 0 {
                break;
            }
        }
        dir &= 7;

        // The east neighbour was examined and is background: right-hand border.
        if (1..=prev_dir).contains(&dir) {
            labels[current] = -nbd;
        } else if labels[current] == 1 {
            labels[current] = nbd;
        }

        contour.points.push(point);
        point.x += NEIGHBORHOOD[dir][0];
        point.y += NEIGHBORHOOD[dir][1];

        if next == pos && current == first_neighbour {
            break;
        }

        current = next;
        dir = (dir + 4) & 7;
    }

    contour
}

/// Extracts every outer and hole border of a binary image, in raster order
/// of their starting pixels.
///
/// # Arguments
/// * `src` - Binary image, any non-zero value is foreground.
/// * `labels` - Scratch label plane, resized as needed and reusable across calls.
pub fn find_contours(src: &ImageBuffer, labels: &mut Vec<i32>) -> Vec<Contour> {
    let width = src.width as usize;
    let height = src.height as usize;
    let mut contours = Vec::new();

    binary_border(src, labels);
    let deltas = neighborhood_deltas((width + 2) as i32);

    let mut pos = width + 3; // first interior pixel
    let mut nbd = 1;

    for y in 0..height {
        for x in 0..width {
            let pix = labels[pos];
            if pix != 0 {
                let outer = pix == 1 && labels[pos - 1] == 0;
                let hole = !outer && pix >= 1 && labels[pos + 1] == 0;

                if outer || hole {
                    nbd += 1;
                    let point = Point2i::new(x as i32, y as i32);
                    contours.push(border_following(labels, pos, nbd, point, hole, &deltas));
                }
            }
            pos += 1;
        }
        pos += 2; // right border, then left border of the next row
    }

    contours
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_border() {
        let src_data = [1, 0, 1, 0, 1, 0, 0, 0, 9];
        let src = ImageBuffer::gray(&src_data, 3, 3);

        let mut labels = vec![7; 3];
        binary_border(&src, &mut labels);
        assert_eq!(labels.len(), 25);

        for i in 0..5 {
            assert_eq!(labels[i], 0);
            assert_eq!(labels[20 + i], 0);
            assert_eq!(labels[i * 5], 0);
            assert_eq!(labels[i * 5 + 4], 0);
        }

        let expected = [1, 0, 1, 0, 1, 0, 0, 0, 1];
        for y in 0..3 {
            for x in 0..3 {
                assert_eq!(labels[(y + 1) * 5 + x + 1], expected[y * 3 + x]);
            }
        }
    }

    #[test]
    fn test_find_contours_ring() {
        // 5x5 image with a one-pixel square ring
        let src_data = [
            0, 0, 0, 0, 0, //
            0, 255, 255, 255, 0, //
            0, 255, 0, 255, 0, //
            0, 255, 255, 255, 0, //
            0, 0, 0, 0, 0,
        ];
        let img = ImageBuffer::gray(&src_data, 5, 5);

        let mut labels = Vec::new();
        let contours = find_contours(&img, &mut labels);

        // An outer border and the border of the enclosed hole.
        assert_eq!(contours.len(), 2);
        assert!(!contours[0].hole);
        assert!(contours[1].hole);
        assert_eq!(contours[0].points.len(), 8);
        assert_eq!(contours[0].points[0], Point2i::new(1, 1));
    }

    #[test]
    fn test_find_contours_filled_square() {
        let mut src_data = vec![0u8; 12 * 12];
        for y in 2..10 {
            for x in 3..9 {
                src_data[y * 12 + x] = 255;
            }
        }
        let img = ImageBuffer::gray(&src_data, 12, 12);

        let mut labels = Vec::new();
        let contours = find_contours(&img, &mut labels);
        assert_eq!(contours.len(), 1);

        let pts = &contours[0].points;
        // Perimeter pixels of a 6x8 block.
        assert_eq!(pts.len(), 2 * (6 + 8) - 4);
        let min_x = pts.iter().map(|p| p.x).min().unwrap();
        let max_x = pts.iter().map(|p| p.x).max().unwrap();
        let min_y = pts.iter().map(|p| p.y).min().unwrap();
        let max_y = pts.iter().map(|p| p.y).max().unwrap();
        assert_eq!((min_x, max_x, min_y, max_y), (3, 8, 2, 9));
    }

    #[test]
    fn test_find_contours_isolated_pixel() {
        let mut src_data = [0u8; 9];
        src_data[4] = 1;
        let img = ImageBuffer::gray(&src_data, 3, 3);

        let mut labels = Vec::new();
        let contours = find_contours(&img, &mut labels);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].points, vec![Point2i::new(1, 1)]);
    }
}
