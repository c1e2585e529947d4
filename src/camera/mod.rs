//! Camera types shared by the distortion corrector, the model builder and the
//! geometry inverter.
//!
//! The [`ImageParams`] struct is the typed form of the classic 8/9 element
//! `ip` vector, [`MVector`] is the 11 coefficient DLT model, and
//! [`CameraModelError`] is the single error type returned by every fallible
//! operation in the crate.

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

pub mod distortion;
pub mod image_params;
pub mod m_vector;

pub use distortion::{undistort_uv, DistortionModel};
pub use image_params::ImageParams;
pub use m_vector::{camera_position_from_slice, MVector, MountOffset, Orientation};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(thiserror::Error, Debug)]
pub enum CameraModelError {
    #[error("Invalid camera parameters: {0}")]
    InvalidParams(String),
    #[error("Length mismatch: {what} has {found} elements, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Invalid axis selector {0} (must be 0, 1 or 2)")]
    InvalidAxisSelector(i64),
    #[error("Mount offset needs pitch, roll and yaw together")]
    PartialMountOffset,
    #[error("Field of view gives a zero or non-finite focal length")]
    DegenerateFieldOfView,
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),
    #[error("Point lies on the vanishing plane of the camera")]
    PointAtVanishingPlane,
    #[error("Failed to load YAML: {0}")]
    YamlError(String),
    #[error("IO Error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for CameraModelError {
    fn from(err: std::io::Error) -> Self {
        CameraModelError::IOError(err.to_string())
    }
}

impl From<yaml_rust::ScanError> for CameraModelError {
    fn from(err: yaml_rust::ScanError) -> Self {
        CameraModelError::YamlError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CameraModelError {
    fn from(err: serde_yaml::Error) -> Self {
        CameraModelError::YamlError(err.to_string())
    }
}

impl From<csv::Error> for CameraModelError {
    fn from(err: csv::Error) -> Self {
        CameraModelError::IOError(err.to_string())
    }
}

/// Trait defining the core functionality for projective camera models
pub trait CameraModel {
    /// Project a 3D world point to 2D image coordinates
    fn project(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError>;

    /// Load camera parameters from a YAML file
    fn load_from_yaml(path: &str) -> Result<Self, CameraModelError>
    where
        Self: Sized;

    /// Save camera parameters to a YAML file
    fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError>;

    /// Validate camera parameters
    fn validate_params(&self) -> Result<(), CameraModelError>;
}

/// Common validation functions for camera parameters
pub mod validation {
    use super::*;

    /// Fails with [`CameraModelError::InvalidParams`] unless `values` holds
    /// one of the `allowed` lengths.
    pub fn expect_len(
        what: &str,
        values: &[f64],
        allowed: &[usize],
    ) -> Result<(), CameraModelError> {
        if allowed.contains(&values.len()) {
            return Ok(());
        }
        let allowed = allowed
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(" or ");
        Err(CameraModelError::InvalidParams(format!(
            "{what} requires {allowed} elements, got {}",
            values.len()
        )))
    }

    pub fn validate_finite(what: &str, values: &[f64]) -> Result<(), CameraModelError> {
        if values.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(CameraModelError::InvalidParams(format!(
                "{what} must be finite"
            )))
        }
    }

    /// Pixel scale factors divide the scaled coordinates, so both must be non-zero.
    pub fn validate_scale(lu: f64, lv: f64) -> Result<(), CameraModelError> {
        validate_finite("Pixel scale", &[lu, lv])?;
        if lu == 0.0 || lv == 0.0 {
            return Err(CameraModelError::InvalidParams(
                "Pixel scale factors must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn check_same_len(
        what: &'static str,
        expected: usize,
        found: usize,
    ) -> Result<(), CameraModelError> {
        if expected != found {
            return Err(CameraModelError::LengthMismatch {
                what,
                expected,
                found,
            });
        }
        Ok(())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_expect_len_message() {
            let err = expect_len("ip", &[1.0; 7], &[8, 9]).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Invalid camera parameters: ip requires 8 or 9 elements, got 7"
            );
            assert!(expect_len("ip", &[1.0; 9], &[8, 9]).is_ok());
        }

        #[test]
        fn test_validate_scale() {
            assert!(validate_scale(1.0, 0.5).is_ok());
            assert!(matches!(
                validate_scale(0.0, 1.0),
                Err(CameraModelError::InvalidParams(_))
            ));
            assert!(validate_scale(f64::NAN, 1.0).is_err());
        }

        #[test]
        fn test_check_same_len() {
            assert!(check_same_len("V", 3, 3).is_ok());
            match check_same_len("V", 3, 2) {
                Err(CameraModelError::LengthMismatch {
                    what,
                    expected,
                    found,
                }) => {
                    assert_eq!(what, "V");
                    assert_eq!(expected, 3);
                    assert_eq!(found, 2);
                }
                other => panic!("unexpected result: {other:?}"),
            }
        }
    }
}
