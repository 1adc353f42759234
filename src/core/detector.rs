// Copyright (c) 2026 kalwalt and AR.js-org contributors
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT
// See https://github.com/AR-js-org/aruco-rs/blob/main/LICENSE
// src/core/detector.rs

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::camera::Camera;
use crate::core::marker::{decode_id, BitMatrix, Marker, BIT_CELLS, MARKER_CELLS};
use crate::cv::contours::{find_contours, Contour};
use crate::cv::geometry::{approx_poly_dp, is_contour_convex, min_corner_distance, perimeter};
use crate::cv::scalar::ScalarCV;
use crate::cv::{ComputerVision, Square, ThresholdMode};
use crate::pose::PoseEstimator;
use crate::{ImageBuffer, MarkerCorners, MarkerError, Point2f, Result, Transformation};

/// Tunable thresholds of the detection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Minimum quad perimeter as a fraction of the larger frame dimension.
    /// Also bounds the raw contour length.
    pub min_perimeter_fraction: f64,
    /// Minimum distance between any two quad corners, in pixels.
    pub min_corner_distance_px: f64,
    /// Polygon approximation tolerance as a fraction of the contour length.
    pub poly_epsilon: f64,
    /// Side of the perspective-corrected marker image; at least one pixel per cell.
    pub canonical_size: usize,
    /// RMS corner distance under which two markers are the same physical tag.
    pub dedup_tolerance_px: f64,
    /// Mean corner reprojection error above which a pose is rejected.
    pub max_reprojection_error_px: f64,
    /// Refinement cap for each POSIT hypothesis.
    pub max_pose_iterations: usize,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            min_perimeter_fraction: 0.2,
            min_corner_distance_px: 10.0,
            poly_epsilon: 0.05,
            canonical_size: 70,
            dedup_tolerance_px: 10.0,
            max_reprojection_error_px: 5.0,
            max_pose_iterations: 100,
        }
    }
}

impl DetectorParams {
    pub fn validate(&self) -> Result<()> {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.min_perimeter_fraction) {
            return Err(MarkerError::InvalidParameter(
                "min_perimeter_fraction must be positive",
            ));
        }
        if !self.min_corner_distance_px.is_finite() || self.min_corner_distance_px < 0.0 {
            return Err(MarkerError::InvalidParameter(
                "min_corner_distance_px must be non-negative",
            ));
        }
        if !positive(self.poly_epsilon) {
            return Err(MarkerError::InvalidParameter("poly_epsilon must be positive"));
        }
        if self.canonical_size < MARKER_CELLS {
            return Err(MarkerError::InvalidParameter(
                "canonical_size must cover one pixel per cell",
            ));
        }
        if !self.dedup_tolerance_px.is_finite() || self.dedup_tolerance_px < 0.0 {
            return Err(MarkerError::InvalidParameter(
                "dedup_tolerance_px must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Per-call working planes, reused across frames.
#[derive(Debug, Default)]
struct Scratch {
    grey: Vec<u8>,
    binary: Vec<u8>,
    labels: Vec<i32>,
    warped: Vec<u8>,
    canonical: Vec<u8>,
}

/// Marker detection and pose pipeline.
///
/// Each [`process_frame`](Self::process_frame) call replaces the previous
/// results. The detector mutates internal scratch buffers, so one instance
/// must not be shared between threads without external locking.
pub struct MarkerDetector<CV: ComputerVision = ScalarCV> {
    backend: CV,
    camera: Camera,
    params: DetectorParams,
    estimator: PoseEstimator,
    scratch: Scratch,
    markers: Vec<Marker>,
    transformations: Vec<Transformation>,
}

impl MarkerDetector<ScalarCV> {
    /// Detector with default parameters and the scalar backend.
    ///
    /// # Arguments
    /// * `camera` - Calibrated camera the frames come from.
    /// * `marker_edge_length` - Physical marker side; poses are reported in this unit.
    pub fn new(camera: Camera, marker_edge_length: f64) -> Result<Self> {
        Self::with_params(camera, marker_edge_length, DetectorParams::default(), ScalarCV)
    }
}

impl<CV: ComputerVision> MarkerDetector<CV> {
    pub fn with_params(
        camera: Camera,
        marker_edge_length: f64,
        params: DetectorParams,
        backend: CV,
    ) -> Result<Self> {
        camera.validate()?;
        params.validate()?;
        let estimator = PoseEstimator::new(
            marker_edge_length,
            params.max_pose_iterations,
            params.max_reprojection_error_px,
        )?;

        Ok(Self {
            backend,
            camera,
            params,
            estimator,
            scratch: Scratch::default(),
            markers: Vec::new(),
            transformations: Vec::new(),
        })
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    pub fn backend(&self) -> &CV {
        &self.backend
    }

    /// Markers accepted in the last successfully processed frame, ordered by id.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Poses of [`markers`](Self::markers), index for index.
    pub fn transformations(&self) -> &[Transformation] {
        &self.transformations
    }

    /// Runs the full pipeline on an interleaved RGB frame.
    ///
    /// Grayscale -> Otsu threshold -> contours -> quad candidates -> decode ->
    /// dedup -> pose. On `InvalidFrame` the previous results are kept.
    pub fn process_frame(&mut self, frame: &ImageBuffer) -> Result<()> {
        if frame.channels != 3
            || frame.width == 0
            || frame.height == 0
            || frame.sample_count() != Some(frame.data.len())
        {
            return Err(frame.invalid());
        }

        let width = frame.width;
        let height = frame.height;
        let len = frame.pixel_count().ok_or_else(|| frame.invalid())?;
        let Scratch {
            grey,
            binary,
            labels,
            warped,
            canonical,
        } = &mut self.scratch;

        // 1. Grayscale
        grey.resize(len, 0);
        CV::grayscale(frame, grey);

        // 2. Threshold, dark ink as foreground
        binary.resize(len, 0);
        let level = CV::otsu(grey);
        CV::threshold(grey, binary, level, ThresholdMode::BinaryInv);

        // 3. Contours and quad candidates
        let contours = find_contours(&ImageBuffer::gray(binary, width, height), labels);
        let mut candidates = find_candidates(&contours, width, height, &self.params);
        clockwise_corners(&mut candidates);
        for candidate in candidates.iter_mut() {
            start_top_left(candidate);
        }

        // 4. Decode
        let grey_buf = ImageBuffer::gray(grey, width, height);
        let size = self.params.canonical_size;
        warped.resize(size * size, 0);
        canonical.resize(size * size, 0);

        let mut markers = Vec::new();
        for candidate in &candidates {
            CV::warp(&grey_buf, warped, candidate, size);
            let level = CV::otsu(warped);
            CV::threshold(warped, canonical, level, ThresholdMode::Binary);

            let canonical_buf = ImageBuffer::gray(canonical, size as u32, size as u32);
            let decoded =
                read_bit_matrix::<CV>(&canonical_buf, size).and_then(|bits| decode_id(&bits));
            match decoded {
                Ok((id, rotations)) => {
                    markers.push(Marker::new(id, reorder_corners(candidate, rotations), rotations));
                }
                Err(err) => trace!(?candidate, %err, "candidate rejected"),
            }
        }

        // 5. Dedup, deterministic order
        let mut markers = dedup_markers(markers, self.params.dedup_tolerance_px);
        markers.sort_by(Marker::cmp_id);

        // 6. Pose
        solve_poses(&self.estimator, &self.camera, &mut markers);

        debug!(
            contours = contours.len(),
            candidates = candidates.len(),
            markers = markers.len(),
            "frame processed"
        );

        self.transformations = markers.iter().map(|m| m.transformation).collect();
        self.markers = markers;
        Ok(())
    }
}

/// Filters raw contours into convex quadrilaterals of sufficient size.
fn find_candidates(
    contours: &[Contour],
    width: u32,
    height: u32,
    params: &DetectorParams,
) -> Vec<MarkerCorners> {
    let min_perimeter = f64::from(width.max(height)) * params.min_perimeter_fraction;
    let mut candidates = Vec::new();

    for contour in contours {
        if (contour.points.len() as f64) < min_perimeter {
            continue;
        }

        let epsilon = contour.points.len() as f64 * params.poly_epsilon;
        let poly = approx_poly_dp(&contour.points, epsilon);
        if poly.len() != 4 || !is_contour_convex(&poly) {
            continue;
        }
        if perimeter(&poly) < min_perimeter
            || min_corner_distance(&poly) < params.min_corner_distance_px
        {
            continue;
        }

        candidates.push([0, 1, 2, 3].map(|i| Point2f::new(poly[i].x as f32, poly[i].y as f32)));
    }
    candidates
}

/// Orders corners clockwise as seen on screen (y down).
fn clockwise_corners(candidates: &mut [MarkerCorners]) {
    for candidate in candidates.iter_mut() {
        let dx1 = candidate[1].x - candidate[0].x;
        let dy1 = candidate[1].y - candidate[0].y;
        let dx2 = candidate[2].x - candidate[0].x;
        let dy2 = candidate[2].y - candidate[0].y;

        if (dx1 * dy2 - dy1 * dx2) < 0.0 {
            candidate.swap(1, 3);
        }
    }
}

/// Rotates the corner list so it starts at the corner nearest the image origin.
fn start_top_left(candidate: &mut MarkerCorners) {
    let first = candidate
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (a.x + a.y).total_cmp(&(b.x + b.y)))
        .map_or(0, |(i, _)| i);
    candidate.rotate_left(first);
}

/// Samples the 7x7 cell grid of a thresholded canonical image.
///
/// Every cell of the outer ring must be mostly black; the inner 5x5 cells
/// are read by majority vote, white = 1.
fn read_bit_matrix<CV: ComputerVision>(
    image: &ImageBuffer,
    canonical_size: usize,
) -> Result<BitMatrix> {
    let cell = canonical_size / MARKER_CELLS;
    let min_white = cell * cell / 2;
    let square = |row: usize, col: usize| Square {
        x: (col * cell) as u32,
        y: (row * cell) as u32,
        width: cell as u32,
        height: cell as u32,
    };

    // Top and bottom rows in full, only the end cells in between.
    for row in 0..MARKER_CELLS {
        let inc = if row == 0 || row == MARKER_CELLS - 1 {
            1
        } else {
            MARKER_CELLS - 1
        };
        for col in (0..MARKER_CELLS).step_by(inc) {
            if CV::count_non_zero(image, &square(row, col)) > min_white {
                return Err(MarkerError::NotAMarker);
            }
        }
    }

    let mut bits = [[0u8; BIT_CELLS]; BIT_CELLS];
    for (r, row) in bits.iter_mut().enumerate() {
        for (c, bit) in row.iter_mut().enumerate() {
            *bit = u8::from(CV::count_non_zero(image, &square(r + 1, c + 1)) > min_white);
        }
    }
    Ok(bits)
}

/// Shifts corners so `corners[0]` is the tag's own top-left, given the number of
/// clockwise grid rotations that decoded it.
fn reorder_corners(corners: &MarkerCorners, rotations: u8) -> MarkerCorners {
    let shift = (4 - rotations as usize % 4) % 4;
    [0, 1, 2, 3].map(|i| corners[(i + shift) % 4])
}

/// Drops markers whose corners lie within `tolerance` (RMS) of an earlier one.
fn dedup_markers(markers: Vec<Marker>, tolerance: f64) -> Vec<Marker> {
    let mut kept: Vec<Marker> = Vec::with_capacity(markers.len());
    for marker in markers {
        let duplicate = kept
            .iter()
            .any(|other| corner_rms(&marker.corners, &other.corners) < tolerance);
        if duplicate {
            trace!(id = marker.id, "duplicate detection dropped");
        } else {
            kept.push(marker);
        }
    }
    kept
}

/// Attaches a pose to every marker; markers whose pose is unresolved are dropped.
fn solve_poses(estimator: &PoseEstimator, camera: &Camera, markers: &mut Vec<Marker>) {
    markers.retain_mut(|marker| match estimator.estimate(camera, &marker.corners) {
        Ok(transformation) => {
            marker.transformation = transformation;
            true
        }
        Err(err) => {
            debug!(id = marker.id, %err, "marker dropped");
            false
        }
    });
}

fn corner_rms(a: &MarkerCorners, b: &MarkerCorners) -> f64 {
    let sum: f64 = a
        .iter()
        .zip(b)
        .map(|(p, q)| f64::from((p - q).norm_squared()))
        .sum();
    (sum / 4.0).sqrt()
}
