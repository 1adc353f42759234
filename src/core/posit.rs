// Copyright (c) 2026 kalwalt and AR.js-org contributors
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT
// See https://github.com/AR-js-org/aruco-rs/blob/main/LICENSE
// src/core/posit.rs

//! Pose from Orthography and Scaling with Iterations, coplanar variant.
//!
//! Works on undistorted normalized image coordinates (unit focal length,
//! principal point at the origin). Each pass solves a scaled orthographic
//! pose, which for a planar model has two solutions mirrored about the model
//! plane; both are refined and the one with the lower reprojection error wins.

use nalgebra::{Matrix3, Vector2, Vector3};

use crate::{MarkerError, Result};

const PINV_EPSILON: f64 = 1e-12;
const MIN_IMPROVEMENT: f64 = 1e-12;

/// The two pose hypotheses of a planar target, best first.
///
/// A square seen at a distance fits two mirrored tilts almost equally well.
/// The alternative stays public so callers tracking a marker across frames
/// can switch to it when the best hypothesis flips.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub best_error: f64,
    pub best_rotation: Matrix3<f64>,
    pub best_translation: Vector3<f64>,
    pub alternative_error: f64,
    pub alternative_rotation: Matrix3<f64>,
    pub alternative_translation: Vector3<f64>,
}

impl Pose {
    fn ordered(first: Candidate, second: Candidate) -> Self {
        let (best, alternative) = if first.error <= second.error {
            (first, second)
        } else {
            (second, first)
        };
        Self {
            best_error: best.error,
            best_rotation: best.rotation,
            best_translation: best.translation,
            alternative_error: alternative.error,
            alternative_rotation: alternative.rotation,
            alternative_translation: alternative.translation,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    error: f64,
    rotation: Matrix3<f64>,
    translation: Vector3<f64>,
}

/// Planar POSIT solver for a square target.
///
/// The model corners lie in the `z = 0` plane, centred on the origin, with
/// `y` pointing down so that the clockwise image corners map onto them in order:
/// `(-h, -h)`, `(h, -h)`, `(h, h)`, `(-h, h)` for half edge `h`.
#[derive(Debug, Clone)]
pub struct Posit {
    model: [Vector3<f64>; 4],
    model_vectors: Matrix3<f64>,
    model_normal: Vector3<f64>,
    model_pseudo_inverse: Matrix3<f64>,
    max_iterations: usize,
}

impl Posit {
    /// Builds the solver for a square of side `edge_length`.
    pub fn new(edge_length: f64, max_iterations: usize) -> Result<Self> {
        if !edge_length.is_finite() || edge_length <= 0.0 {
            return Err(MarkerError::InvalidParameter(
                "marker edge length must be positive",
            ));
        }

        let half = edge_length / 2.0;
        let model = [
            Vector3::new(-half, -half, 0.0),
            Vector3::new(half, -half, 0.0),
            Vector3::new(half, half, 0.0),
            Vector3::new(-half, half, 0.0),
        ];

        let model_vectors = Matrix3::from_rows(&[
            (model[1] - model[0]).transpose(),
            (model[2] - model[0]).transpose(),
            (model[3] - model[0]).transpose(),
        ]);

        let svd = model_vectors.svd(true, true);
        let v_t = svd
            .v_t
            .as_ref()
            .ok_or(MarkerError::InvalidParameter("model decomposition failed"))?;
        let model_normal = v_t.row(svd.singular_values.imin()).transpose();
        let model_pseudo_inverse = svd
            .pseudo_inverse(PINV_EPSILON)
            .map_err(MarkerError::InvalidParameter)?;

        Ok(Self {
            model,
            model_vectors,
            model_normal,
            model_pseudo_inverse,
            max_iterations,
        })
    }

    /// Model corners in marker coordinates, in image corner order.
    pub fn model(&self) -> &[Vector3<f64>; 4] {
        &self.model
    }

    /// Estimates the pose from four normalized image points.
    ///
    /// Returns `None` when the correspondences do not determine a pose, e.g.
    /// collapsed quads or points that put the target behind the camera.
    pub fn pose(&self, points: &[Vector2<f64>; 4]) -> Option<Pose> {
        let [first, second] = self.pos(points, &Vector3::repeat(1.0))?;
        let first = self.iterate(points, first);
        let second = self.iterate(points, second);
        Some(Pose::ordered(first, second))
    }

    /// Mean distance, in normalized units, between `points` and the model
    /// projected under `[rotation | translation]`.
    pub fn reprojection_error(
        &self,
        points: &[Vector2<f64>; 4],
        rotation: &Matrix3<f64>,
        translation: &Vector3<f64>,
    ) -> f64 {
        let mut sum = 0.0;
        for (corner, point) in self.model.iter().zip(points) {
            let cam = rotation * corner + translation;
            if cam.z <= f64::EPSILON {
                return f64::INFINITY;
            }
            sum += (cam.xy() / cam.z - point).norm();
        }
        sum / 4.0
    }

    /// One scaled-orthographic solve with perspective corrections `eps`.
    fn pos(&self, points: &[Vector2<f64>; 4], eps: &Vector3<f64>) -> Option<[Candidate; 2]> {
        let origin = points[0];
        let xi = Vector3::new(points[1].x, points[2].x, points[3].x);
        let yi = Vector3::new(points[1].y, points[2].y, points[3].y);

        let xs = xi.component_mul(eps).add_scalar(-origin.x);
        let ys = yi.component_mul(eps).add_scalar(-origin.y);

        let i0 = self.model_pseudo_inverse * xs;
        let j0 = self.model_pseudo_inverse * ys;

        // Solve |I| = |J|, I.J = 0 for I = I0 + lambda n, J = J0 + mu n.
        let s = j0.norm_squared() - i0.norm_squared();
        let ij = i0.dot(&j0);
        let theta = (-2.0 * ij).atan2(s) / 2.0;
        let r = (s * s + 4.0 * ij * ij).sqrt().sqrt();

        let lambda = r * theta.cos();
        let mu = r * theta.sin();

        let first = self.candidate(
            points,
            i0 + self.model_normal * lambda,
            j0 + self.model_normal * mu,
        )?;
        let second = self.candidate(
            points,
            i0 - self.model_normal * lambda,
            j0 - self.model_normal * mu,
        )?;
        Some([first, second])
    }

    fn candidate(
        &self,
        points: &[Vector2<f64>; 4],
        i: Vector3<f64>,
        j: Vector3<f64>,
    ) -> Option<Candidate> {
        let inorm = i.norm();
        let jnorm = j.norm();
        if inorm <= f64::EPSILON || jnorm <= f64::EPSILON {
            return None;
        }

        let i = i / inorm;
        let j = j / jnorm;
        let rows = Matrix3::from_rows(&[i.transpose(), j.transpose(), i.cross(&j).transpose()]);
        let rotation = nearest_rotation(&rows)?;

        // `scale` is the inverse depth of the reference corner.
        let scale = (inorm + jnorm) / 2.0;
        let reference = rotation * self.model[0];
        let translation = Vector3::new(
            points[0].x / scale - reference.x,
            points[0].y / scale - reference.y,
            1.0 / scale - reference.z,
        );
        if !translation.iter().all(|v| v.is_finite()) {
            return None;
        }

        Some(Candidate {
            error: self.reprojection_error(points, &rotation, &translation),
            rotation,
            translation,
        })
    }

    fn iterate(&self, points: &[Vector2<f64>; 4], start: Candidate) -> Candidate {
        let mut best = start;

        for _ in 0..self.max_iterations {
            let depth = best.translation.z + (best.rotation * self.model[0]).z;
            if depth <= f64::EPSILON {
                break;
            }

            let row2 = best.rotation.row(2).transpose();
            let eps = (self.model_vectors * row2 / depth).add_scalar(1.0);

            let Some([first, second]) = self.pos(points, &eps) else {
                break;
            };
            let next = if first.error <= second.error {
                first
            } else {
                second
            };

            if next.error >= best.error {
                break;
            }
            let improvement = best.error - next.error;
            best = next;
            if improvement < MIN_IMPROVEMENT {
                break;
            }
        }

        best
    }
}

/// Closest proper rotation to `m` in the Frobenius sense.
pub fn nearest_rotation(m: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fix = u;
        u_fix.column_mut(2).neg_mut();
        r = u_fix * v_t;
    }
    Some(r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn project(posit: &Posit, rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> [Vector2<f64>; 4] {
        posit.model().map(|m| {
            let cam = rotation * m + translation;
            cam.xy() / cam.z
        })
    }

    #[test]
    fn test_posit_frontal() {
        let posit = Posit::new(9.0, 100).unwrap();
        let translation = Vector3::new(3.0, 0.0, 50.0);
        let points = project(&posit, &Matrix3::identity(), &translation);

        let pose = posit.pose(&points).unwrap();

        assert_relative_eq!(pose.best_rotation, Matrix3::identity(), epsilon = 1e-6);
        assert_relative_eq!(pose.best_translation, translation, epsilon = 1e-6);
        assert!(pose.best_error < 1e-6);
    }

    #[test]
    fn test_posit_tilted() {
        let posit = Posit::new(9.0, 100).unwrap();
        let rotation = *Rotation3::from_euler_angles(10f64.to_radians(), 25f64.to_radians(), 0.0)
            .matrix();
        let translation = Vector3::new(1.0, -2.0, 60.0);
        let points = project(&posit, &rotation, &translation);

        let pose = posit.pose(&points).unwrap();

        assert_relative_eq!(pose.best_rotation, rotation, epsilon = 1e-6);
        assert_relative_eq!(pose.best_translation, translation, epsilon = 1e-4);
        assert_relative_eq!(pose.best_rotation.determinant(), 1.0, epsilon = 1e-9);
        assert!(pose.best_error <= pose.alternative_error);
    }

    #[test]
    fn test_posit_collapsed_quad() {
        let posit = Posit::new(9.0, 100).unwrap();
        let points = [Vector2::new(0.1, 0.1); 4];
        assert!(posit.pose(&points).is_none());
    }

    #[test]
    fn test_posit_rejects_bad_edge() {
        assert!(matches!(
            Posit::new(0.0, 10),
            Err(MarkerError::InvalidParameter(_))
        ));
        assert!(Posit::new(f64::NAN, 10).is_err());
    }

    #[test]
    fn test_nearest_rotation_fixes_reflection() {
        let reflected = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0));
        let r = nearest_rotation(&reflected).unwrap();
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-12);
    }
}
