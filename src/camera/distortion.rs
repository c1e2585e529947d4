//! Radial lens distortion about the principal point.
//!
//! Raw detected pixel coordinates are mapped to undistorted ones by scaling
//! their offset from the principal point with a low order polynomial in the
//! radius. Two polynomial forms exist and are kept as separate variants of
//! [`DistortionModel`] so the choice is made once, when the parameters are
//! built, instead of on every call.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::camera::{validation, CameraModelError, ImageParams};

/// Radial distortion polynomial.
///
/// * `Simple`: `s = 1 + d1·r² + d2`
/// * `Extended`: `s = 1 + d1·r² + d3·r + d2`
///
/// The extended form is not a strict superset of the simple one with `d3 = 0`
/// evaluated in a different order; both are reproduced exactly as observed in
/// existing `ip` files, so results stay bit compatible with them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DistortionModel {
    Simple { d1: f64, d2: f64 },
    Extended { d1: f64, d2: f64, d3: f64 },
}

impl DistortionModel {
    /// Builds the model from the trailing coefficients of an `ip` vector:
    /// `[d1, d2]` or `[d1, d2, d3]`.
    pub fn from_coefficients(coefficients: &[f64]) -> Result<Self, CameraModelError> {
        validation::validate_finite("Distortion coefficients", coefficients)?;
        match *coefficients {
            [d1, d2] => Ok(DistortionModel::Simple { d1, d2 }),
            [d1, d2, d3] => Ok(DistortionModel::Extended { d1, d2, d3 }),
            _ => Err(CameraModelError::InvalidParams(format!(
                "Distortion requires 2 or 3 coefficients, got {}",
                coefficients.len()
            ))),
        }
    }

    /// Coefficients in `ip` order.
    pub fn coefficients(&self) -> Vec<f64> {
        match *self {
            DistortionModel::Simple { d1, d2 } => vec![d1, d2],
            DistortionModel::Extended { d1, d2, d3 } => vec![d1, d2, d3],
        }
    }

    /// Scale factor applied to an offset of radius `r` from the principal point.
    pub fn scale(&self, r: f64) -> f64 {
        match *self {
            DistortionModel::Simple { d1, d2 } => 1.0 + d1 * r * r + d2,
            DistortionModel::Extended { d1, d2, d3 } => 1.0 + d1 * r * r + d3 * r + d2,
        }
    }
}

/// Undistorts a single pixel. Shared by the scalar and batched entry points
/// so both produce identical bits.
pub(crate) fn undistort_scalar(ip: &ImageParams, ud: f64, vd: f64) -> (f64, f64) {
    let (lu, lv) = ip.scale;
    let (u0, v0) = ip.principal_point;

    let du = lu * ud - u0;
    let dv = lv * vd - v0;
    let s = ip.distortion.scale((du * du + dv * dv).sqrt());

    ((du * s + u0) / lu, (dv * s + v0) / lv)
}

/// Removes radial distortion from a batch of raw pixel coordinates.
///
/// # Arguments
///
/// * `ud` - Distorted horizontal pixel coordinates.
/// * `vd` - Distorted vertical pixel coordinates, same length as `ud`.
/// * `ip` - Image parameters holding scale, principal point and distortion.
///
/// # Errors
///
/// [`CameraModelError::LengthMismatch`] when `ud` and `vd` differ in length.
///
/// # Examples
///
/// ```rust
/// use nalgebra::DVector;
/// use dlt_tools::camera::{undistort_uv, ImageParams};
///
/// let ip = ImageParams::from_slice(&[1.0, 1.0, 1000.0, 800.0, 500.0, 400.0, -0.0001, 0.0]).unwrap();
/// let (u, v) = undistort_uv(&DVector::from_vec(vec![520.0]), &DVector::from_vec(vec![410.0]), &ip).unwrap();
/// assert!((u[0] - 519.0).abs() < 1e-9);
/// assert!((v[0] - 409.5).abs() < 1e-9);
/// ```
pub fn undistort_uv(
    ud: &DVector<f64>,
    vd: &DVector<f64>,
    ip: &ImageParams,
) -> Result<(DVector<f64>, DVector<f64>), CameraModelError> {
    validation::check_same_len("Vd", ud.len(), vd.len())?;

    let mut u = DVector::zeros(ud.len());
    let mut v = DVector::zeros(vd.len());
    for (i, (&x, &y)) in ud.iter().zip(vd.iter()).enumerate() {
        let (ux, vy) = undistort_scalar(ip, x, y);
        u[i] = ux;
        v[i] = vy;
    }

    Ok((u, v))
}
