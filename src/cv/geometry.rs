// Copyright (c) 2026 kalwalt and AR.js-org contributors
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT
// See https://github.com/AR-js-org/aruco-rs/blob/main/LICENSE
// src/cv/geometry.rs

use std::cmp::Ordering;

use nalgebra::Matrix3;

use crate::{MarkerCorners, Point2f, Point2i};

/// Run of contour indices from `start` to `end` inclusive; indices may exceed the
/// contour length and wrap around.
#[derive(Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

/// Douglas-Peucker simplification of a closed contour.
///
/// The first split is seeded by the two mutually farthest points found with
/// three farthest-point sweeps, then spans are split on their farthest point
/// until every point lies within `epsilon` of its chord.
///
/// # Arguments
/// * `contour` - The closed boundary.
/// * `epsilon` - Maximum allowed distance from the simplified polygon.
///
/// # Returns
/// The retained vertices, in contour order.
pub fn approx_poly_dp(contour: &[Point2i], epsilon: f64) -> Vec<Point2i> {
    let len = contour.len();
    if len == 0 {
        return Vec::new();
    }

    let at = |i: usize| contour[i % len];
    let epsilon_sq = epsilon * epsilon;
    let mut poly = Vec::new();
    let mut stack: Vec<Span> = Vec::new();

    // Seed: walk to the farthest point three times to land on a diameter.
    let mut start = 0;
    let mut far_offset = 0;
    let mut max_dist = 0.0;
    for _ in 0..3 {
        start = (start + far_offset) % len;
        let origin = contour[start];
        max_dist = 0.0;
        far_offset = 0;
        for offset in 1..len {
            let pt = at(start + offset);
            let dx = (pt.x - origin.x) as f64;
            let dy = (pt.y - origin.y) as f64;
            let dist = dx * dx + dy * dy;
            if dist > max_dist {
                max_dist = dist;
                far_offset = offset;
            }
        }
    }

    if max_dist <= epsilon_sq {
        poly.push(contour[start]);
        return poly;
    }

    // Two spans closing the loop: start -> far, then far -> start (wrapped).
    let far = start + far_offset;
    stack.push(Span {
        start: far,
        end: start + len,
    });
    stack.push(Span { start, end: far });

    while let Some(span) = stack.pop() {
        let start_pt = at(span.start);
        let end_pt = at(span.end);

        let mut split = None;
        if span.end > span.start + 1 {
            let dx = (end_pt.x - start_pt.x) as f64;
            let dy = (end_pt.y - start_pt.y) as f64;
            let mut max_dist = 0.0;
            for i in (span.start + 1)..span.end {
                let pt = at(i);
                let dist = ((pt.y - start_pt.y) as f64 * dx - (pt.x - start_pt.x) as f64 * dy).abs();
                if dist > max_dist {
                    max_dist = dist;
                    split = Some(i);
                }
            }
            if max_dist * max_dist <= epsilon_sq * (dx * dx + dy * dy) {
                split = None;
            }
        }

        match split {
            None => poly.push(start_pt),
            Some(mid) => {
                stack.push(Span {
                    start: mid,
                    end: span.end,
                });
                stack.push(Span {
                    start: span.start,
                    end: mid,
                });
            }
        }
    }

    poly
}

/// Closed-polygon perimeter.
pub fn perimeter(poly: &[Point2i]) -> f64 {
    let len = poly.len();
    (0..len)
        .map(|i| {
            let a = poly[i];
            let b = poly[(i + 1) % len];
            let dx = (b.x - a.x) as f64;
            let dy = (b.y - a.y) as f64;
            (dx * dx + dy * dy).sqrt()
        })
        .sum()
}

/// Smallest distance between any two vertices, diagonals included.
pub fn min_corner_distance(poly: &[Point2i]) -> f64 {
    let mut min_d = f64::INFINITY;
    for (i, a) in poly.iter().enumerate() {
        for b in &poly[i + 1..] {
            let dx = (b.x - a.x) as f64;
            let dy = (b.y - a.y) as f64;
            min_d = min_d.min(dx * dx + dy * dy);
        }
    }
    if min_d.is_finite() {
        min_d.sqrt()
    } else {
        0.0
    }
}

/// Tests whether the polygon is strictly convex. Collinear or repeated
/// vertices count as non-convex.
pub fn is_contour_convex(contour: &[Point2i]) -> bool {
    let len = contour.len();
    if len < 3 {
        return false;
    }

    let mut orientation = 0u8;
    for i in 0..len {
        let prev = contour[(i + len - 1) % len];
        let cur = contour[i];
        let next = contour[(i + 1) % len];

        // i64 keeps the cross product exact for any i32 coordinates.
        let cross = (cur.x - prev.x) as i64 * (next.y - cur.y) as i64
            - (cur.y - prev.y) as i64 * (next.x - cur.x) as i64;

        orientation |= match cross.cmp(&0) {
            Ordering::Greater => 1,
            Ordering::Less => 2,
            Ordering::Equal => 3,
        };
        if orientation == 3 {
            return false;
        }
    }
    true
}

/// Homography sending the square `[0, size]^2` onto `quad`, corner for corner:
/// `(0, 0) -> quad[0]`, `(size, 0) -> quad[1]`, `(size, size) -> quad[2]`,
/// `(0, size) -> quad[3]`.
pub fn square_to_quad(quad: &MarkerCorners, size: f64) -> Matrix3<f64> {
    let p = quad.map(|c: Point2f| (c.x as f64, c.y as f64));
    let px = p[0].0 - p[1].0 + p[2].0 - p[3].0;
    let py = p[0].1 - p[1].1 + p[2].1 - p[3].1;

    let unit = if px == 0.0 && py == 0.0 {
        // Parallelogram: the map is affine.
        Matrix3::new(
            p[1].0 - p[0].0, p[2].0 - p[1].0, p[0].0, //
            p[1].1 - p[0].1, p[2].1 - p[1].1, p[0].1, //
            0.0, 0.0, 1.0,
        )
    } else {
        let dx1 = p[1].0 - p[2].0;
        let dx2 = p[3].0 - p[2].0;
        let dy1 = p[1].1 - p[2].1;
        let dy2 = p[3].1 - p[2].1;
        let den = dx1 * dy2 - dx2 * dy1;
        let g = (px * dy2 - dx2 * py) / den;
        let h = (dx1 * py - px * dy1) / den;

        Matrix3::new(
            p[1].0 - p[0].0 + g * p[1].0, p[3].0 - p[0].0 + h * p[3].0, p[0].0, //
            p[1].1 - p[0].1 + g * p[1].1, p[3].1 - p[0].1 + h * p[3].1, p[0].1, //
            g, h, 1.0,
        )
    };

    unit * Matrix3::new(
        1.0 / size, 0.0, 0.0, //
        0.0, 1.0 / size, 0.0, //
        0.0, 0.0, 1.0,
    )
}
