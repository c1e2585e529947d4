//! The 11 coefficient Direct Linear Transformation model (Walton M-vector).
//!
//! An [`MVector`] fully determines the projective mapping between world
//! coordinates `(x, y, z)` and pixel coordinates `(U, V)`:
//!
//! ```text
//! U = (A·x + B·y + C·z + D) / (E·x + F·y + G·z + 1)
//! V = (H·x + J·y + K·z + L) / (E·x + F·y + G·z + 1)
//! ```
//!
//! [`MVector::from_orientation`] builds it from INS style pitch/yaw/roll
//! angles, the horizontal field of view, the camera position and the image
//! parameters, optionally composing a fixed camera mounting offset.

use crate::camera::image_params::yaml_f64_list;
use crate::camera::{validation, CameraModel, CameraModelError, ImageParams};
use nalgebra::{Matrix2xX, Matrix3, Matrix3xX, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::{fmt, fs, io::Write};
use yaml_rust::YamlLoader;

/// Platform orientation in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub pitch: f64,
    pub yaw: f64,
    /// Horizontal field of view.
    pub fov: f64,
    pub roll: f64,
}

impl Orientation {
    /// Parses `[pitch, yaw, fov, roll]`.
    pub fn from_slice(angles: &[f64]) -> Result<Self, CameraModelError> {
        validation::expect_len("angles", angles, &[4])?;
        validation::validate_finite("angles", angles)?;
        Ok(Orientation {
            pitch: angles[0],
            yaw: angles[1],
            fov: angles[2],
            roll: angles[3],
        })
    }
}

/// Fixed rotation between the INS platform and the camera body, in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MountOffset {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

impl MountOffset {
    /// Collects individually optional offset angles.
    ///
    /// Returns `Ok(None)` when none is given and `Ok(Some(_))` when all three
    /// are given. Any other combination leaves the rotation undefined and is
    /// rejected with [`CameraModelError::PartialMountOffset`].
    pub fn from_parts(
        pitch: Option<f64>,
        roll: Option<f64>,
        yaw: Option<f64>,
    ) -> Result<Option<Self>, CameraModelError> {
        match (pitch, roll, yaw) {
            (None, None, None) => Ok(None),
            (Some(pitch), Some(roll), Some(yaw)) => Ok(Some(MountOffset { pitch, roll, yaw })),
            _ => Err(CameraModelError::PartialMountOffset),
        }
    }

    /// `Rg = yaw · roll · pitch`
    pub fn rotation(&self) -> Matrix3<f64> {
        rotation_yaw(self.yaw) * rotation_roll(self.roll) * rotation_pitch(self.pitch)
    }
}

/// Parses a camera position `[x, y, z]`.
pub fn camera_position_from_slice(camera: &[f64]) -> Result<Vector3<f64>, CameraModelError> {
    validation::expect_len("camera", camera, &[3])?;
    validation::validate_finite("camera", camera)?;
    Ok(Vector3::new(camera[0], camera[1], camera[2]))
}

/// Rotation by `yaw` about the vertical axis.
pub fn rotation_yaw(yaw: f64) -> Matrix3<f64> {
    let (s, c) = yaw.sin_cos();
    Matrix3::new(
        c, s, 0.0, //
        -s, c, 0.0, //
        0.0, 0.0, 1.0,
    )
}

/// Rotation by `roll` about the forward axis.
pub fn rotation_roll(roll: f64) -> Matrix3<f64> {
    let (s, c) = roll.sin_cos();
    Matrix3::new(
        c, 0.0, -s, //
        0.0, 1.0, 0.0, //
        s, 0.0, c,
    )
}

/// Rotation by `pitch` about the lateral axis.
pub fn rotation_pitch(pitch: f64) -> Matrix3<f64> {
    let (s, c) = pitch.sin_cos();
    Matrix3::new(
        1.0, 0.0, 0.0, //
        0.0, c, s, //
        0.0, -s, c,
    )
}

/// DLT coefficients `[A, B, C, D, E, F, G, H, J, K, L]`.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MVector {
    m: [f64; 11],
}

impl fmt::Debug for MVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MVector {:?}", self.m)
    }
}

impl MVector {
    /// Wraps exactly 11 coefficients.
    pub fn from_slice(m: &[f64]) -> Result<Self, CameraModelError> {
        validation::expect_len("M-vector", m, &[11])?;
        let mut coefficients = [0.0; 11];
        coefficients.copy_from_slice(m);

        let model = MVector { m: coefficients };
        model.validate_params()?;
        Ok(model)
    }

    pub fn coefficients(&self) -> &[f64; 11] {
        &self.m
    }

    /// Builds the M-vector of a camera from its orientation, position and
    /// image parameters.
    ///
    /// The focal length in pixels is `width / 2 / tan(fov / 2)`. Without a
    /// mounting offset the world to camera rotation is `R = roll · pitch · yaw`;
    /// with one it is `R = (yaw · roll · pitch · Rg)ᵗ`. Only the pixel scale,
    /// the image width and the principal point of `ip` are used.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::InvalidParams`]: the image width `uWidth` is zero.
    /// * [`CameraModelError::DegenerateFieldOfView`]: `tan(fov / 2)` is zero or
    ///   the focal length is not finite.
    /// * [`CameraModelError::DegenerateGeometry`]: the world origin lies in the
    ///   principal plane of the camera, so the normalization term is zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use nalgebra::Vector3;
    /// use dlt_tools::camera::{CameraModel, ImageParams, MVector, Orientation};
    ///
    /// let ip = ImageParams::from_slice(&[1.0, 1.0, 1000.0, 800.0, 500.0, 400.0, 0.0, 0.0]).unwrap();
    /// let angles = Orientation { pitch: 0.0, yaw: 0.3, fov: 1.0, roll: 0.0 };
    /// let m = MVector::from_orientation(&angles, &Vector3::new(0.0, 0.0, 100.0), &ip, None).unwrap();
    ///
    /// let centre = m.project(&Vector3::new(0.0, 0.0, 0.0)).unwrap();
    /// assert!((centre.x - 500.0).abs() < 1e-9);
    /// assert!((centre.y - 400.0).abs() < 1e-9);
    /// ```
    pub fn from_orientation(
        orientation: &Orientation,
        camera: &Vector3<f64>,
        ip: &ImageParams,
        offset: Option<MountOffset>,
    ) -> Result<Self, CameraModelError> {
        let (lu, lv) = ip.scale;
        let (u0, v0) = ip.principal_point;
        let width = ip.image_size.0;
        if width == 0.0 {
            return Err(CameraModelError::InvalidParams(
                "uWidth must be non-zero to derive a focal length".to_string(),
            ));
        }

        let tan_half_fov = (orientation.fov / 2.0).tan();
        if tan_half_fov == 0.0 {
            return Err(CameraModelError::DegenerateFieldOfView);
        }
        let f = width / 2.0 / tan_half_fov;
        if !f.is_finite() {
            return Err(CameraModelError::DegenerateFieldOfView);
        }

        let a = rotation_yaw(orientation.yaw);
        let b = rotation_roll(orientation.roll);
        let c = rotation_pitch(orientation.pitch);

        let r = match offset {
            Some(offset) => {
                log::debug!("Composing camera mount offset {offset:?}");
                (a * b * c * offset.rotation()).transpose()
            }
            None => b * c * a,
        };

        let (cx, cy, cz) = (camera.x, camera.y, camera.z);
        let l = -(cx * r[(2, 0)] + cy * r[(2, 1)] + cz * r[(2, 2)]);
        if l == 0.0 || !l.is_finite() {
            return Err(CameraModelError::DegenerateGeometry(
                "world origin lies in the principal plane of the camera".to_string(),
            ));
        }
        log::debug!("Focal length {f:.3} px, normalization term L = {l:.6}");

        let mut m = [0.0; 11];
        for j in 0..3 {
            m[j] = lu * (u0 * r[(2, j)] + f * r[(0, j)]) / l;
            m[4 + j] = r[(2, j)] / l;
            m[7 + j] = lv * (v0 * r[(2, j)] + f * r[(1, j)]) / l;
        }
        m[3] = -(m[0] * cx + m[1] * cy + m[2] * cz);
        m[10] = -(m[7] * cx + m[8] * cy + m[9] * cz);

        let model = MVector { m };
        model.validate_params()?;
        Ok(model)
    }

    /// Projects every column of `points_3d`.
    ///
    /// # Errors
    ///
    /// Fails on the first point lying on the vanishing plane.
    pub fn project_points(
        &self,
        points_3d: &Matrix3xX<f64>,
    ) -> Result<Matrix2xX<f64>, CameraModelError> {
        let mut points_2d = Matrix2xX::zeros(points_3d.ncols());
        for (i, point) in points_3d.column_iter().enumerate() {
            let uv = self.project(&point.into_owned())?;
            points_2d.set_column(i, &uv);
        }
        Ok(points_2d)
    }
}

impl CameraModel for MVector {
    /// Applies the forward DLT equations to a world point.
    ///
    /// # Errors
    ///
    /// [`CameraModelError::PointAtVanishingPlane`] when the common denominator
    /// `E·x + F·y + G·z + 1` is exactly zero or the result is not finite.
    /// Points merely close to the vanishing plane project far off the image,
    /// as the closed form does.
    fn project(&self, point_3d: &Vector3<f64>) -> Result<Vector2<f64>, CameraModelError> {
        let [a, b, c, d, e, f, g, h, j, k, l] = self.m;
        let (x, y, z) = (point_3d.x, point_3d.y, point_3d.z);

        let denominator = e * x + f * y + g * z + 1.0;
        if denominator == 0.0 {
            return Err(CameraModelError::PointAtVanishingPlane);
        }

        let uv = Vector2::new(
            (a * x + b * y + c * z + d) / denominator,
            (h * x + j * y + k * z + l) / denominator,
        );
        if !(uv.x.is_finite() && uv.y.is_finite()) {
            return Err(CameraModelError::PointAtVanishingPlane);
        }
        Ok(uv)
    }

    /// Loads an M-vector from a YAML file:
    ///
    /// ```yaml
    /// dlt:
    ///   m: [A, B, C, D, E, F, G, H, J, K, L]
    /// ```
    fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        log::debug!("Loading M-vector from: {path}");
        let contents = fs::read_to_string(path)?;
        let docs = YamlLoader::load_from_str(&contents)?;
        let doc = docs.first().ok_or_else(|| {
            CameraModelError::YamlError(format!("{path} contains no YAML document"))
        })?;

        let m = yaml_f64_list(&doc["dlt"]["m"], "m", 11)?;
        MVector::from_slice(&m)
    }

    fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        let yaml = serde_yaml::Mapping::from_iter([(
            serde_yaml::Value::String("dlt".to_string()),
            serde_yaml::to_value(serde_yaml::Mapping::from_iter([(
                serde_yaml::Value::String("m".to_string()),
                serde_yaml::to_value(self.m.to_vec())?,
            )]))?,
        )]);

        let yaml_string = serde_yaml::to_string(&yaml)?;
        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;

        log::info!("Saved M-vector to: {path}");
        Ok(())
    }

    fn validate_params(&self) -> Result<(), CameraModelError> {
        validation::validate_finite("M-vector", &self.m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_ip() -> ImageParams {
        ImageParams::from_slice(&[1.0, 1.0, 1000.0, 800.0, 500.0, 400.0, -0.0001, 0.0]).unwrap()
    }

    fn oblique() -> Orientation {
        Orientation {
            pitch: 0.35,
            yaw: 1.2,
            fov: 0.9,
            roll: -0.04,
        }
    }

    #[test]
    fn test_rotations_are_orthonormal() {
        for rotation in [rotation_yaw(0.7), rotation_roll(-1.1), rotation_pitch(2.3)] {
            assert_relative_eq!(
                rotation * rotation.transpose(),
                Matrix3::identity(),
                epsilon = 1e-12
            );
            assert_relative_eq!(rotation.determinant(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rotation_sign_patterns() {
        let angle = 0.25_f64;
        let (s, c) = angle.sin_cos();

        let yaw = rotation_yaw(angle);
        assert_eq!(yaw[(0, 1)], s);
        assert_eq!(yaw[(1, 0)], -s);
        let roll = rotation_roll(angle);
        assert_eq!(roll[(0, 2)], -s);
        assert_eq!(roll[(2, 0)], s);
        let pitch = rotation_pitch(angle);
        assert_eq!(pitch[(1, 2)], s);
        assert_eq!(pitch[(2, 1)], -s);
        assert_eq!(pitch[(1, 1)], c);
    }

    #[test]
    fn test_nadir_camera_maps_point_below_to_principal_point() {
        let ip = unit_ip();
        for yaw in [0.0, 0.8, -2.0] {
            let angles = Orientation {
                pitch: 0.0,
                yaw,
                fov: 1.0,
                roll: 0.0,
            };
            let m = MVector::from_orientation(&angles, &Vector3::new(0.0, 0.0, 120.0), &ip, None)
                .unwrap();

            let uv = m.project(&Vector3::zeros()).unwrap();
            assert_relative_eq!(uv.x, 500.0, epsilon = 1e-9);
            assert_relative_eq!(uv.y, 400.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_camera_centre_lies_on_vanishing_plane() {
        let camera = Vector3::new(350.0, -120.0, 45.0);
        let offset = Some(MountOffset {
            pitch: 0.1,
            roll: 0.02,
            yaw: -0.3,
        });

        for offset in [None, offset] {
            let m = MVector::from_orientation(&oblique(), &camera, &unit_ip(), offset).unwrap();
            let c = m.coefficients();
            let denominator = c[4] * camera.x + c[5] * camera.y + c[6] * camera.z + 1.0;
            assert_relative_eq!(denominator, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_coefficients_follow_rotation() {
        let ip = unit_ip();
        let camera = Vector3::new(10.0, 20.0, 100.0);
        let angles = oblique();
        let m = MVector::from_orientation(&angles, &camera, &ip, None).unwrap();

        let r = rotation_roll(angles.roll) * rotation_pitch(angles.pitch) * rotation_yaw(angles.yaw);
        let l = -(camera.dot(&r.row(2).transpose()));
        let f = 1000.0 / 2.0 / (angles.fov / 2.0).tan();
        let c = m.coefficients();

        assert_relative_eq!(c[4], r[(2, 0)] / l, max_relative = 1e-12);
        assert_relative_eq!(c[0], (500.0 * r[(2, 0)] + f * r[(0, 0)]) / l, max_relative = 1e-12);
        assert_relative_eq!(c[9], (400.0 * r[(2, 2)] + f * r[(1, 2)]) / l, max_relative = 1e-12);
        assert_relative_eq!(
            c[3],
            -(c[0] * camera.x + c[1] * camera.y + c[2] * camera.z),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_coefficients_follow_offset_rotation() {
        let ip = unit_ip();
        let camera = Vector3::new(-40.0, 75.0, 160.0);
        let angles = oblique();
        let offset = MountOffset {
            pitch: 0.12,
            roll: -0.07,
            yaw: 0.4,
        };
        let m = MVector::from_orientation(&angles, &camera, &ip, Some(offset)).unwrap();

        let rg = rotation_yaw(offset.yaw) * rotation_roll(offset.roll) * rotation_pitch(offset.pitch);
        let r = (rotation_yaw(angles.yaw)
            * rotation_roll(angles.roll)
            * rotation_pitch(angles.pitch)
            * rg)
            .transpose();
        let l = -(camera.dot(&r.row(2).transpose()));
        let f = 1000.0 / 2.0 / (angles.fov / 2.0).tan();
        let c = m.coefficients();

        assert_relative_eq!(c[0], (500.0 * r[(2, 0)] + f * r[(0, 0)]) / l, max_relative = 1e-12);
        assert_relative_eq!(c[4], r[(2, 0)] / l, max_relative = 1e-12);
        assert_relative_eq!(c[5], r[(2, 1)] / l, max_relative = 1e-12);
        assert_relative_eq!(c[9], (400.0 * r[(2, 2)] + f * r[(1, 2)]) / l, max_relative = 1e-12);
    }

    #[test]
    fn test_mount_offset_rotation_order() {
        let offset = MountOffset {
            pitch: 0.3,
            roll: -0.5,
            yaw: 1.1,
        };
        assert_relative_eq!(
            offset.rotation(),
            rotation_yaw(1.1) * rotation_roll(-0.5) * rotation_pitch(0.3),
            epsilon = 1e-15
        );
        assert!(
            (offset.rotation() - rotation_pitch(0.3) * rotation_roll(-0.5) * rotation_yaw(1.1))
                .abs()
                .max()
                > 1e-3
        );
    }

    #[test]
    fn test_width_must_be_non_zero() {
        let camera = Vector3::new(0.0, 0.0, 50.0);
        let zero_width =
            ImageParams::from_slice(&[1.0, 1.0, 0.0, 800.0, 500.0, 400.0, 0.0, 0.0]).unwrap();
        assert!(matches!(
            MVector::from_orientation(&oblique(), &camera, &zero_width, None),
            Err(CameraModelError::InvalidParams(_))
        ));

        let fractional =
            ImageParams::from_slice(&[1.0, 1.0, 1000.5, 0.0, 500.0, 400.0, 0.0, 0.0]).unwrap();
        assert!(MVector::from_orientation(&oblique(), &camera, &fractional, None).is_ok());
    }

    #[test]
    fn test_zero_offset_on_level_platform_matches_no_offset() {
        let angles = Orientation {
            pitch: 0.0,
            yaw: 0.0,
            fov: 0.8,
            roll: 0.0,
        };
        let camera = Vector3::new(5.0, 6.0, 70.0);
        let zero = MountOffset::from_parts(Some(0.0), Some(0.0), Some(0.0)).unwrap();

        let plain = MVector::from_orientation(&angles, &camera, &unit_ip(), None).unwrap();
        let offset = MVector::from_orientation(&angles, &camera, &unit_ip(), zero).unwrap();
        for (p, o) in plain.coefficients().iter().zip(offset.coefficients()) {
            assert_relative_eq!(*p, *o, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_offset_changes_model() {
        let camera = Vector3::new(5.0, 6.0, 70.0);
        let offset = MountOffset {
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.2,
        };
        let plain = MVector::from_orientation(&oblique(), &camera, &unit_ip(), None).unwrap();
        let shifted =
            MVector::from_orientation(&oblique(), &camera, &unit_ip(), Some(offset)).unwrap();
        assert_ne!(plain, shifted);
    }

    #[test]
    fn test_mount_offset_from_parts() {
        assert_eq!(MountOffset::from_parts(None, None, None).unwrap(), None);
        assert_eq!(
            MountOffset::from_parts(Some(0.1), Some(0.2), Some(0.3)).unwrap(),
            Some(MountOffset {
                pitch: 0.1,
                roll: 0.2,
                yaw: 0.3
            })
        );
        for parts in [
            (Some(0.1), None, None),
            (None, Some(0.2), None),
            (None, None, Some(0.3)),
            (Some(0.1), Some(0.2), None),
        ] {
            assert!(matches!(
                MountOffset::from_parts(parts.0, parts.1, parts.2),
                Err(CameraModelError::PartialMountOffset)
            ));
        }
    }

    #[test]
    fn test_zero_fov_is_rejected() {
        let angles = Orientation {
            fov: 0.0,
            ..oblique()
        };
        let result =
            MVector::from_orientation(&angles, &Vector3::new(0.0, 0.0, 10.0), &unit_ip(), None);
        assert!(matches!(result, Err(CameraModelError::DegenerateFieldOfView)));
    }

    #[test]
    fn test_camera_at_origin_is_degenerate() {
        let result = MVector::from_orientation(&oblique(), &Vector3::zeros(), &unit_ip(), None);
        assert!(matches!(result, Err(CameraModelError::DegenerateGeometry(_))));
    }

    #[test]
    fn test_slice_lengths() {
        assert!(Orientation::from_slice(&[0.1, 0.2, 0.3, 0.4]).is_ok());
        assert!(matches!(
            Orientation::from_slice(&[0.1, 0.2, 0.3]),
            Err(CameraModelError::InvalidParams(_))
        ));
        assert!(camera_position_from_slice(&[1.0, 2.0, 3.0]).is_ok());
        assert!(matches!(
            camera_position_from_slice(&[1.0, 2.0]),
            Err(CameraModelError::InvalidParams(_))
        ));
        assert!(MVector::from_slice(&[0.5; 11]).is_ok());
        for len in [10, 12] {
            assert!(matches!(
                MVector::from_slice(&vec![0.5; len]),
                Err(CameraModelError::InvalidParams(_))
            ));
        }
    }

    #[test]
    fn test_project_on_vanishing_plane() {
        let mut raw = [0.0; 11];
        raw[0] = 1.0;
        raw[4] = 1.0;
        let m = MVector::from_slice(&raw).unwrap();

        assert!(matches!(
            m.project(&Vector3::new(-1.0, 3.0, 4.0)),
            Err(CameraModelError::PointAtVanishingPlane)
        ));
        assert_relative_eq!(m.project(&Vector3::new(1.0, 0.0, 0.0)).unwrap().x, 0.5);

        // Denominator of 2^-53, far below f64::EPSILON but not zero.
        let near = m
            .project(&Vector3::new(-(1.0 - f64::EPSILON / 2.0), 0.0, 0.0))
            .unwrap();
        assert!(near.x < -1.0e15 && near.x.is_finite());
    }

    #[test]
    fn test_project_points_matches_project() {
        let m = MVector::from_orientation(&oblique(), &Vector3::new(0.0, 0.0, 50.0), &unit_ip(), None)
            .unwrap();
        let points = Matrix3xX::from_columns(&[
            Vector3::new(10.0, 40.0, 0.0),
            Vector3::new(-5.0, 60.0, 1.5),
        ]);

        let projected = m.project_points(&points).unwrap();
        for i in 0..points.ncols() {
            let single = m.project(&points.column(i).into_owned()).unwrap();
            assert_eq!(projected.column(i).into_owned(), single);
        }
    }

    #[test]
    fn test_load_from_yaml() {
        let m = MVector::load_from_yaml("samples/m_vector.yaml").unwrap();
        assert_eq!(m.coefficients()[0], -8.98e-3);
        assert_eq!(m.coefficients()[10], 412.5);
    }

    #[test]
    fn test_save_to_yaml() {
        fs::create_dir_all("output").expect("Failed to create output directory for test.");
        let output_path = "output/m_vector_saved.yaml";

        let m = MVector::from_orientation(&oblique(), &Vector3::new(3.0, 4.0, 80.0), &unit_ip(), None)
            .unwrap();
        m.save_to_yaml(output_path).unwrap();
        let saved = MVector::load_from_yaml(output_path).unwrap();

        assert_eq!(m, saved);
        fs::remove_file(output_path).unwrap();
    }
}
