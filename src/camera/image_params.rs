//! Intrinsic and distortion parameters of a camera (`ip`).
//!
//! Historically these travel as a flat vector of 8 or 9 numbers,
//! `[lu, lv, uWidth, vWidth, u0, v0, d1, d2, (d3)]`. [`ImageParams`] is the
//! typed form of that vector; [`ImageParams::from_slice`] and
//! [`ImageParams::to_vec`] convert between the two, and the YAML helpers read
//! and write the `cam0:` configuration layout.

use crate::camera::distortion::undistort_scalar;
use crate::camera::{validation, CameraModelError, DistortionModel, Resolution};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use yaml_rust::YamlLoader;

/// Image geometry and lens parameters.
///
/// # Examples
///
/// ```rust
/// use dlt_tools::camera::{DistortionModel, ImageParams};
///
/// let ip = ImageParams::from_slice(&[1.0, 1.0, 1000.0, 800.0, 500.0, 400.0, -0.0001, 0.0]).unwrap();
/// assert_eq!(ip.image_size, (1000.0, 800.0));
/// assert_eq!(ip.distortion, DistortionModel::Simple { d1: -0.0001, d2: 0.0 });
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageParams {
    /// Pixel scale factors `(lu, lv)`, units per pixel.
    pub scale: (f64, f64),
    /// Image size `(uWidth, vWidth)` in pixels. Only the width enters the
    /// model builder; the height is carried for the grid helpers.
    pub image_size: (f64, f64),
    /// Principal point `(u0, v0)` in scaled pixel units; also the distortion centre.
    pub principal_point: (f64, f64),
    /// Radial distortion polynomial.
    pub distortion: DistortionModel,
}

impl ImageParams {
    /// Parses a flat `ip` vector of exactly 8 or 9 values.
    ///
    /// # Errors
    ///
    /// [`CameraModelError::InvalidParams`] for any other length, for non-finite
    /// entries, or for zero pixel scale.
    pub fn from_slice(ip: &[f64]) -> Result<Self, CameraModelError> {
        validation::expect_len("ip", ip, &[8, 9])?;
        validation::validate_finite("ip", ip)?;

        let params = ImageParams {
            scale: (ip[0], ip[1]),
            image_size: (ip[2], ip[3]),
            principal_point: (ip[4], ip[5]),
            distortion: DistortionModel::from_coefficients(&ip[6..])?,
        };

        params.validate_params()?;
        Ok(params)
    }

    /// Flattens back into the 8 or 9 element `ip` layout.
    pub fn to_vec(&self) -> Vec<f64> {
        let mut ip = vec![
            self.scale.0,
            self.scale.1,
            self.image_size.0,
            self.image_size.1,
            self.principal_point.0,
            self.principal_point.1,
        ];
        ip.extend(self.distortion.coefficients());
        ip
    }

    /// Whole-pixel image size for the pixel grid helpers.
    ///
    /// # Errors
    ///
    /// [`CameraModelError::InvalidParams`] unless both dimensions are positive
    /// whole numbers that fit in a `u32`.
    pub fn resolution(&self) -> Result<Resolution, CameraModelError> {
        Ok(Resolution {
            width: whole_pixels("uWidth", self.image_size.0)?,
            height: whole_pixels("vWidth", self.image_size.1)?,
        })
    }

    /// Removes radial distortion from one raw pixel coordinate.
    pub fn undistort_point(&self, point_2d: &Vector2<f64>) -> Vector2<f64> {
        let (u, v) = undistort_scalar(self, point_2d.x, point_2d.y);
        Vector2::new(u, v)
    }

    pub fn validate_params(&self) -> Result<(), CameraModelError> {
        validation::validate_scale(self.scale.0, self.scale.1)?;
        validation::validate_finite("Image size", &[self.image_size.0, self.image_size.1])?;
        validation::validate_finite(
            "Principal point",
            &[self.principal_point.0, self.principal_point.1],
        )?;
        validation::validate_finite(
            "Distortion coefficients",
            &self.distortion.coefficients(),
        )?;
        Ok(())
    }

    /// Loads image parameters from a YAML file.
    ///
    /// Expected layout:
    ///
    /// ```yaml
    /// cam0:
    ///   camera_model: dlt_ip
    ///   scale: [1.0, 1.0]
    ///   resolution: [1000, 800]
    ///   principal_point: [500.0, 400.0]
    ///   distortion: [-0.0001, 0.0]
    /// ```
    ///
    /// Two distortion coefficients select [`DistortionModel::Simple`], three
    /// select [`DistortionModel::Extended`].
    pub fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        log::debug!("Loading image parameters from: {path}");
        let contents = fs::read_to_string(path)?;
        let docs = YamlLoader::load_from_str(&contents)?;
        let doc = docs.first().ok_or_else(|| {
            CameraModelError::YamlError(format!("{path} contains no YAML document"))
        })?;
        let cam = &doc["cam0"];

        let scale = yaml_f64_list(&cam["scale"], "scale", 2)?;
        let principal_point = yaml_f64_list(&cam["principal_point"], "principal_point", 2)?;
        let distortion = cam["distortion"].as_vec().ok_or_else(|| {
            CameraModelError::InvalidParams("YAML missing 'distortion' or not an array".to_string())
        })?;
        let distortion = yaml_f64_list(&cam["distortion"], "distortion", distortion.len())?;

        let resolution = yaml_f64_list(&cam["resolution"], "resolution", 2)?;

        let params = ImageParams {
            scale: (scale[0], scale[1]),
            image_size: (resolution[0], resolution[1]),
            principal_point: (principal_point[0], principal_point[1]),
            distortion: DistortionModel::from_coefficients(&distortion)?,
        };

        params.validate_params()?;
        Ok(params)
    }

    /// Saves the image parameters in the layout read by [`ImageParams::load_from_yaml`].
    pub fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        let yaml = serde_yaml::Mapping::from_iter([(
            serde_yaml::Value::String("cam0".to_string()),
            serde_yaml::to_value(serde_yaml::Mapping::from_iter([
                (
                    serde_yaml::Value::String("camera_model".to_string()),
                    serde_yaml::Value::String("dlt_ip".to_string()),
                ),
                (
                    serde_yaml::Value::String("scale".to_string()),
                    serde_yaml::to_value(vec![self.scale.0, self.scale.1])?,
                ),
                (
                    serde_yaml::Value::String("resolution".to_string()),
                    serde_yaml::to_value(vec![self.image_size.0, self.image_size.1])?,
                ),
                (
                    serde_yaml::Value::String("principal_point".to_string()),
                    serde_yaml::to_value(vec![self.principal_point.0, self.principal_point.1])?,
                ),
                (
                    serde_yaml::Value::String("distortion".to_string()),
                    serde_yaml::to_value(self.distortion.coefficients())?,
                ),
            ]))?,
        )]);

        let yaml_string = serde_yaml::to_string(&yaml)?;
        let mut file = fs::File::create(path)?;
        file.write_all(yaml_string.as_bytes())?;

        log::info!("Saved image parameters to: {path}");
        Ok(())
    }
}

fn whole_pixels(name: &str, value: f64) -> Result<u32, CameraModelError> {
    if !(value >= 1.0 && value.fract() == 0.0 && value <= u32::MAX as f64) {
        return Err(CameraModelError::InvalidParams(format!(
            "{name} must be a positive whole number of pixels for a pixel grid, got {value}"
        )));
    }
    Ok(value as u32)
}

/// Reads a YAML list of exactly `len` numbers. Integers are accepted as floats.
pub(crate) fn yaml_f64_list(
    value: &yaml_rust::Yaml,
    name: &str,
    len: usize,
) -> Result<Vec<f64>, CameraModelError> {
    let items = value.as_vec().ok_or_else(|| {
        CameraModelError::InvalidParams(format!("YAML missing '{name}' or not an array"))
    })?;
    if items.len() != len {
        return Err(CameraModelError::InvalidParams(format!(
            "'{name}' requires {len} elements, got {}",
            items.len()
        )));
    }
    items
        .iter()
        .map(|item| {
            item.as_f64()
                .or_else(|| item.as_i64().map(|v| v as f64))
                .ok_or_else(|| {
                    CameraModelError::InvalidParams(format!("Invalid {name}: not a number"))
                })
        })
        .collect()
}
