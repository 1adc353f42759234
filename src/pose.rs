// Copyright (c) 2026 kalwalt and AR.js-org contributors
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT
// See https://github.com/AR-js-org/aruco-rs/blob/main/LICENSE
// src/pose.rs

use nalgebra::{Matrix3, Vector2, Vector3};
use tracing::trace;

use crate::camera::Camera;
use crate::core::posit::Posit;
use crate::{MarkerCorners, MarkerError, Result, Transformation};

/// Recovers marker-to-camera transforms from observed pixel corners.
#[derive(Debug, Clone)]
pub struct PoseEstimator {
    posit: Posit,
    max_reprojection_error_px: f64,
}

impl PoseEstimator {
    /// # Arguments
    /// * `edge_length` - Physical side of the marker; translations come out in the same unit.
    /// * `max_iterations` - POSIT refinement cap per hypothesis.
    /// * `max_reprojection_error_px` - Largest accepted mean corner reprojection error, in pixels.
    pub fn new(
        edge_length: f64,
        max_iterations: usize,
        max_reprojection_error_px: f64,
    ) -> Result<Self> {
        if !max_reprojection_error_px.is_finite() || max_reprojection_error_px <= 0.0 {
            return Err(MarkerError::InvalidParameter(
                "reprojection error gate must be positive",
            ));
        }
        Ok(Self {
            posit: Posit::new(edge_length, max_iterations)?,
            max_reprojection_error_px,
        })
    }

    /// 3-D marker corners matching `corners[0..4]` of a detected marker.
    pub fn model(&self) -> &[Vector3<f64>; 4] {
        self.posit.model()
    }

    /// Solves `[R | t]` for one marker.
    ///
    /// Pixels are undistorted into normalized coordinates before solving; the
    /// result is then projected back through the full camera model and must
    /// land within the configured pixel error of the observed corners.
    pub fn estimate(&self, camera: &Camera, corners: &MarkerCorners) -> Result<Transformation> {
        let points = corners.map(|c| camera.normalize(&c));
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(MarkerError::PoseUnresolved("corner normalization diverged"));
        }

        let pose = self
            .posit
            .pose(&points)
            .ok_or(MarkerError::PoseUnresolved("degenerate corner configuration"))?;

        let rotation = pose.best_rotation;
        let translation = pose.best_translation;
        if !rotation.iter().chain(translation.iter()).all(|v| v.is_finite()) {
            return Err(MarkerError::PoseUnresolved("non-finite pose"));
        }
        if translation.z <= 0.0 {
            return Err(MarkerError::PoseUnresolved("marker behind the camera"));
        }
        if (rotation.determinant() - 1.0).abs() > 1e-6 {
            return Err(MarkerError::PoseUnresolved("rotation is not proper"));
        }

        let error = self.pixel_error(camera, corners, &rotation, &translation)?;
        trace!(
            error_px = error,
            normalized_error = pose.best_error,
            alternative_error = pose.alternative_error,
            "pose solved"
        );
        if error > self.max_reprojection_error_px {
            return Err(MarkerError::PoseUnresolved("reprojection error too large"));
        }

        let mut transformation = Transformation::zeros();
        transformation.fixed_view_mut::<3, 3>(0, 0).copy_from(&rotation);
        transformation.set_column(3, &translation);
        Ok(transformation)
    }

    fn pixel_error(
        &self,
        camera: &Camera,
        corners: &MarkerCorners,
        rotation: &Matrix3<f64>,
        translation: &Vector3<f64>,
    ) -> Result<f64> {
        let mut sum = 0.0;
        for (model, corner) in self.model().iter().zip(corners) {
            let projected = camera
                .project(&(rotation * model + translation))
                .ok_or(MarkerError::PoseUnresolved("corner behind the camera"))?;
            let observed = Vector2::new(corner.x as f64, corner.y as f64);
            sum += (projected - observed).norm();
        }
        Ok(sum / 4.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Distortion;
    use crate::Point2f;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn observe(
        camera: &Camera,
        estimator: &PoseEstimator,
        rotation: &Matrix3<f64>,
        translation: &Vector3<f64>,
    ) -> MarkerCorners {
        estimator.model().map(|m| {
            let px = camera.project(&(rotation * m + translation)).unwrap();
            Point2f::new(px.x as f32, px.y as f32)
        })
    }

    #[test]
    fn test_estimate_frontal() {
        let camera = Camera::new(800.0, 800.0, 320.0, 240.0);
        let estimator = PoseEstimator::new(9.0, 100, 5.0).unwrap();
        let translation = Vector3::new(2.0, 0.0, 50.0);
        let corners = observe(&camera, &estimator, &Matrix3::identity(), &translation);

        let t = estimator.estimate(&camera, &corners).unwrap();

        assert_relative_eq!(
            t.fixed_view::<3, 3>(0, 0).into_owned(),
            Matrix3::identity(),
            epsilon = 1e-4
        );
        assert_relative_eq!(t[(2, 3)], 50.0, epsilon = 1e-2);
        assert_relative_eq!(t[(0, 3)], 2.0, epsilon = 1e-2);
        assert_relative_eq!(t[(1, 3)], 0.0, epsilon = 1e-2);
    }

    #[test]
    fn test_estimate_tilted_with_distortion() {
        let camera = Camera::new(700.0, 710.0, 330.0, 235.0)
            .with_distortion(Distortion::from_coefficients([-0.1, 0.02, 0.001, -0.001, 0.0]));
        let estimator = PoseEstimator::new(12.0, 100, 5.0).unwrap();
        let rotation = *Rotation3::from_euler_angles(0.3, -0.4, 0.2).matrix();
        let translation = Vector3::new(-3.0, 4.0, 80.0);
        let corners = observe(&camera, &estimator, &rotation, &translation);

        let t = estimator.estimate(&camera, &corners).unwrap();
        let r = t.fixed_view::<3, 3>(0, 0).into_owned();

        // f32 corners limit the achievable accuracy.
        assert_relative_eq!(r, rotation, epsilon = 1e-2);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(t.column(3).into_owned(), translation, epsilon = 0.5);
    }

    #[test]
    fn test_estimate_degenerate_quad() {
        let camera = Camera::new(800.0, 800.0, 320.0, 240.0);
        let estimator = PoseEstimator::new(9.0, 100, 5.0).unwrap();
        let corners = [Point2f::new(100.0, 100.0); 4];

        assert!(matches!(
            estimator.estimate(&camera, &corners),
            Err(MarkerError::PoseUnresolved(_))
        ));
    }

    #[test]
    fn test_estimate_rejects_inconsistent_corners() {
        // A strongly non-projective quad cannot reproject within a pixel.
        let camera = Camera::new(800.0, 800.0, 320.0, 240.0);
        let estimator = PoseEstimator::new(9.0, 100, 1.0).unwrap();
        let corners = [
            Point2f::new(300.0, 200.0),
            Point2f::new(420.0, 205.0),
            Point2f::new(330.0, 260.0),
            Point2f::new(290.0, 330.0),
        ];

        assert!(estimator.estimate(&camera, &corners).is_err());
    }

    #[test]
    fn test_new_validates_gate() {
        assert!(matches!(
            PoseEstimator::new(9.0, 100, 0.0),
            Err(MarkerError::InvalidParameter(_))
        ));
        assert!(PoseEstimator::new(-1.0, 100, 2.0).is_err());
    }
}
