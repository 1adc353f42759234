// Copyright (c) 2026 kalwalt and AR.js-org contributors
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT
// See https://github.com/AR-js-org/aruco-rs/blob/main/LICENSE
// src/camera.rs

use nalgebra::{Matrix3, Matrix4, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::{MarkerError, Point2f, Result, Transformation};

/// Brown-Conrady lens distortion with three radial and two tangential terms.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    const UNDISTORT_ITERATIONS: usize = 20;

    /// Builds the model from a coefficient vector in OpenCV order `[k1, k2, p1, p2, k3]`.
    pub fn from_coefficients(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    pub fn coefficients(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn is_zero(&self) -> bool {
        self.coefficients().iter().all(|c| *c == 0.0)
    }

    fn radial(&self, r2: f64) -> f64 {
        1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3))
    }

    fn tangential(&self, x: f64, y: f64) -> Vector2<f64> {
        let r2 = x * x + y * y;
        Vector2::new(
            2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        )
    }

    /// Applies the distortion to an undistorted normalized point.
    pub fn distort(&self, n: &Vector2<f64>) -> Vector2<f64> {
        let radial = self.radial(n.norm_squared());
        n * radial + self.tangential(n.x, n.y)
    }

    /// Inverts [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, d: &Vector2<f64>) -> Vector2<f64> {
        if self.is_zero() {
            return *d;
        }

        let mut n = *d;
        for _ in 0..Self::UNDISTORT_ITERATIONS {
            let radial = self.radial(n.norm_squared());
            if radial.abs() < f64::EPSILON {
                break;
            }
            let next = (d - self.tangential(n.x, n.y)) / radial;
            let step = (next - n).norm_squared();
            n = next;
            if step < 1e-24 {
                break;
            }
        }
        n
    }
}

fn identity_extrinsic() -> Transformation {
    Transformation::identity()
}

/// Calibrated pinhole camera: intrinsics, distortion and the last assigned extrinsic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub distortion: Distortion,
    #[serde(skip, default = "identity_extrinsic")]
    extrinsic: Transformation,
}

impl Camera {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            distortion: Distortion::default(),
            extrinsic: identity_extrinsic(),
        }
    }

    pub fn with_distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = distortion;
        self
    }

    /// Rejects focal lengths and principal points that cannot describe a real sensor.
    pub fn validate(&self) -> Result<()> {
        let finite = [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .chain(self.distortion.coefficients().iter())
            .all(|v| v.is_finite());
        if !finite {
            return Err(MarkerError::InvalidParameter(
                "camera parameters must be finite",
            ));
        }
        if self.fx <= 0.0 || self.fy <= 0.0 {
            return Err(MarkerError::InvalidParameter(
                "focal lengths must be positive",
            ));
        }
        Ok(())
    }

    pub fn intrinsic_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    pub fn extrinsic(&self) -> &Transformation {
        &self.extrinsic
    }

    /// Stores a marker pose as the camera's current extrinsic, as the renderer expects.
    pub fn set_extrinsic(&mut self, extrinsic: Transformation) {
        self.extrinsic = extrinsic;
    }

    /// Projects a camera-space point onto the image, distortion included.
    /// Returns `None` for points on or behind the camera plane.
    pub fn project(&self, p: &Vector3<f64>) -> Option<Vector2<f64>> {
        if p.z <= f64::EPSILON {
            return None;
        }
        let d = self.distortion.distort(&Vector2::new(p.x / p.z, p.y / p.z));
        Some(Vector2::new(
            self.fx * d.x + self.cx,
            self.fy * d.y + self.cy,
        ))
    }

    /// Maps a pixel to undistorted normalized image coordinates (the z = 1 plane).
    pub fn normalize(&self, pixel: &Point2f) -> Vector2<f64> {
        let d = Vector2::new(
            (pixel.x as f64 - self.cx) / self.fx,
            (pixel.y as f64 - self.cy) / self.fy,
        );
        self.distortion.undistort(&d)
    }

    /// Converts the extrinsic from the OpenCV camera frame (y down, z forward)
    /// to the OpenGL one (y up, z backward).
    pub fn flip_extrinsic_yz(&self) -> Transformation {
        let mut flipped = self.extrinsic;
        for c in 0..4 {
            flipped[(1, c)] = -flipped[(1, c)];
            flipped[(2, c)] = -flipped[(2, c)];
        }
        flipped
    }

    /// Column-major OpenGL projection matrix equivalent to the intrinsics for a
    /// `width` x `height` viewport.
    pub fn gl_projection(&self, width: f64, height: f64, near: f64, far: f64) -> [f32; 16] {
        let mut m = [0.0f32; 16];
        m[0] = (2.0 * self.fx / width) as f32;
        m[5] = (2.0 * self.fy / height) as f32;
        m[8] = (1.0 - 2.0 * self.cx / width) as f32;
        m[9] = (2.0 * self.cy / height - 1.0) as f32;
        m[10] = (-(far + near) / (far - near)) as f32;
        m[11] = -1.0;
        m[14] = (-2.0 * far * near / (far - near)) as f32;
        m
    }

    /// Column-major OpenGL model-view matrix built from the flipped extrinsic.
    pub fn gl_modelview(&self) -> [f32; 16] {
        let flipped = self.flip_extrinsic_yz();
        let mut h = Matrix4::<f64>::identity();
        h.fixed_view_mut::<3, 4>(0, 0).copy_from(&flipped);

        let mut m = [0.0f32; 16];
        for (dst, src) in m.iter_mut().zip(h.iter()) {
            *dst = *src as f32;
        }
        m
    }
}
