//! Inversion of the DLT model and helpers built on top of it.
//!
//! A pixel observation fixes a ray, not a point, so one of the three world
//! coordinates has to be supplied. [`find_xyz`] takes that known coordinate
//! (one value for all points or one per point) and solves the remaining two
//! in closed form. The remaining functions use it to map whole pixel grids
//! or the image outline onto a plane, and to check a model against surveyed
//! control points.

use crate::camera::{
    undistort_uv, validation, CameraModel, CameraModelError, ImageParams, MVector, Resolution,
};
use nalgebra::{DVector, Matrix2xX, Matrix3xX, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The world axis whose value is known for each observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KnownAxis {
    X,
    Y,
    Z,
}

impl TryFrom<i64> for KnownAxis {
    type Error = CameraModelError;

    /// `0 → X`, `1 → Y`, `2 → Z`.
    fn try_from(flag: i64) -> Result<Self, Self::Error> {
        match flag {
            0 => Ok(KnownAxis::X),
            1 => Ok(KnownAxis::Y),
            2 => Ok(KnownAxis::Z),
            other => Err(CameraModelError::InvalidAxisSelector(other)),
        }
    }
}

/// Recovers world coordinates from pixel coordinates and one known coordinate.
///
/// Substituting the DLT equations and clearing the common denominator gives,
/// per observation, two linear equations in `(x, y, z)`:
///
/// ```text
/// M·x + N·y + O·z = P      M = E·U − A, N = F·U − B, O = G·U − C, P = D − U
/// Q·x + R·y + S·z = T      Q = E·V − H, R = F·V − J, S = G·V − K, T = L − V
/// ```
///
/// With the `axis` coordinate fixed to `val`, the other two follow from
/// Cramer's rule.
///
/// # Arguments
///
/// * `m` - The DLT model.
/// * `u`, `v` - Pixel coordinates, one entry per observation. Pass undistorted
///   coordinates when the lens is not distortion free.
/// * `val` - Known coordinate. A single value is used for every observation,
///   otherwise it must hold one value per observation.
/// * `axis` - Which coordinate `val` holds.
///
/// # Return Value
///
/// A `3xN` matrix whose column `i` is `(x, y, z)` of observation `i`.
///
/// # Errors
///
/// * [`CameraModelError::LengthMismatch`]: `u` and `v` differ in length, or
///   `val` is neither a single value nor one per observation.
/// * [`CameraModelError::InvalidParams`]: `u`, `v` or `val` holds a NaN or
///   infinite value.
/// * [`CameraModelError::DegenerateGeometry`]: an observation has no finite
///   solution, i.e. its ray is parallel to the plane of the known coordinate.
///   Nothing is returned for the other observations in that case.
///
/// # Examples
///
/// ```rust
/// use nalgebra::{DVector, Vector3};
/// use dlt_tools::camera::{CameraModel, ImageParams, MVector, Orientation};
/// use dlt_tools::geometry::{find_xyz, KnownAxis};
///
/// let ip = ImageParams::from_slice(&[1.0, 1.0, 1000.0, 800.0, 500.0, 400.0, 0.0, 0.0]).unwrap();
/// let angles = Orientation { pitch: 0.4, yaw: 0.1, fov: 1.0, roll: 0.0 };
/// let m = MVector::from_orientation(&angles, &Vector3::new(0.0, 0.0, 30.0), &ip, None).unwrap();
///
/// let target = Vector3::new(4.0, 12.0, 0.0);
/// let uv = m.project(&target).unwrap();
/// let xyz = find_xyz(
///     &m,
///     &DVector::from_vec(vec![uv.x]),
///     &DVector::from_vec(vec![uv.y]),
///     &DVector::from_vec(vec![0.0]),
///     KnownAxis::Z,
/// )
/// .unwrap();
/// assert!((xyz[(0, 0)] - 4.0).abs() < 1e-6);
/// assert!((xyz[(1, 0)] - 12.0).abs() < 1e-6);
/// ```
pub fn find_xyz(
    m: &MVector,
    u: &DVector<f64>,
    v: &DVector<f64>,
    val: &DVector<f64>,
    axis: KnownAxis,
) -> Result<Matrix3xX<f64>, CameraModelError> {
    let count = u.len();
    validation::check_same_len("V", count, v.len())?;
    let broadcast = val.len() == 1;
    if !broadcast {
        validation::check_same_len("val", count, val.len())?;
    }
    validation::validate_finite("U", u.as_slice())?;
    validation::validate_finite("V", v.as_slice())?;
    validation::validate_finite("val", val.as_slice())?;

    let [a, b, c, d, e, f, g, h, j, k, l] = *m.coefficients();

    let mut xyz = Matrix3xX::zeros(count);
    for i in 0..count {
        let (ui, vi) = (u[i], v[i]);
        let known = if broadcast { val[0] } else { val[i] };

        let cm = e * ui - a;
        let cn = f * ui - b;
        let co = g * ui - c;
        let cp = d - ui;
        let cq = e * vi - h;
        let cr = f * vi - j;
        let cs = g * vi - k;
        let ct = l - vi;

        let point = match axis {
            KnownAxis::X => {
                let x = known;
                let y = ((co * cq - cs * cm) * x + (cs * cp - co * ct)) / (cs * cn - co * cr);
                let z = ((cn * cq - cr * cm) * x + (cr * cp - cn * ct)) / (cr * co - cn * cs);
                Vector3::new(x, y, z)
            }
            KnownAxis::Y => {
                let y = known;
                let x = ((co * cr - cs * cn) * y + (cs * cp - co * ct)) / (cs * cm - co * cq);
                let z = ((cm * cr - cq * cn) * y + (cq * cp - cm * ct)) / (cq * co - cm * cs);
                Vector3::new(x, y, z)
            }
            KnownAxis::Z => {
                let z = known;
                let x = ((cn * cs - cr * co) * z + (cr * cp - cn * ct)) / (cr * cm - cn * cq);
                let y = ((cm * cs - cq * co) * z + (cq * cp - cm * ct)) / (cq * cn - cm * cr);
                Vector3::new(x, y, z)
            }
        };

        if !point.iter().all(|coord| coord.is_finite()) {
            log::warn!(
                "No finite solution for pixel ({ui}, {vi}) with {axis:?} = {known}: {point:?}"
            );
            return Err(CameraModelError::DegenerateGeometry(format!(
                "observation {i} at pixel ({ui}, {vi}) has no finite solution with {axis:?} = {known}"
            )));
        }
        xyz.set_column(i, &point);
    }

    Ok(xyz)
}

/// Generate a grid of sample points that are evenly distributed across the image
///
/// # Arguments
///
/// * `resolution` - Image size in pixels
/// * `n` - The approximate number of points to generate
///
/// # Returns
///
/// A `2xN` matrix of pixel coordinates at the centre of each grid cell,
/// empty when `n` or either dimension is zero
pub fn sample_points(resolution: &Resolution, n: usize) -> Matrix2xX<f64> {
    if n == 0 || resolution.width == 0 || resolution.height == 0 {
        return Matrix2xX::zeros(0);
    }
    let width = resolution.width as f64;
    let height = resolution.height as f64;

    // Calculate the number of cells in each dimension
    let num_cells_x = ((n as f64 * (width / height)).sqrt().round() as usize).max(1);
    let num_cells_y = ((n as f64 * (height / width)).sqrt().round() as usize).max(1);

    let cell_width = width / num_cells_x as f64;
    let cell_height = height / num_cells_y as f64;

    let mut points_2d = Matrix2xX::zeros(num_cells_x * num_cells_y);
    let mut idx = 0;
    for i in 0..num_cells_y {
        for j in 0..num_cells_x {
            let x = (j as f64 + 0.5) * cell_width;
            let y = (i as f64 + 0.5) * cell_height;
            points_2d.set_column(idx, &Vector2::new(x, y));
            idx += 1;
        }
    }

    points_2d
}

/// The four corners of an image of `(width, height)` pixels, clockwise from the origin.
pub fn image_corners(image_size: (f64, f64)) -> Matrix2xX<f64> {
    let (width, height) = image_size;
    Matrix2xX::from_columns(&[
        Vector2::new(0.0, 0.0),
        Vector2::new(width, 0.0),
        Vector2::new(width, height),
        Vector2::new(0.0, height),
    ])
}

/// Maps raw pixels onto the plane where `axis` equals `value`.
///
/// When `undistort` is set the pixels are first corrected with the distortion
/// model of `ip`.
pub fn map_to_plane(
    m: &MVector,
    ip: &ImageParams,
    pixels: &Matrix2xX<f64>,
    value: f64,
    axis: KnownAxis,
    undistort: bool,
) -> Result<Matrix3xX<f64>, CameraModelError> {
    let ud: DVector<f64> = pixels.row(0).transpose();
    let vd: DVector<f64> = pixels.row(1).transpose();

    let (u, v) = if undistort {
        undistort_uv(&ud, &vd, ip)?
    } else {
        (ud, vd)
    };

    find_xyz(m, &u, &v, &DVector::from_element(1, value), axis)
}

/// World outline of the image on the horizontal plane `z = ground_z`.
///
/// Corners are undistorted before inversion. A corner ray above the horizon
/// meets the plane behind the camera; only an exactly parallel ray fails.
pub fn ground_footprint(
    m: &MVector,
    ip: &ImageParams,
    ground_z: f64,
) -> Result<Matrix3xX<f64>, CameraModelError> {
    let corners = image_corners(ip.image_size);
    let footprint = map_to_plane(m, ip, &corners, ground_z, KnownAxis::Z, true)?;
    log::debug!("Ground footprint at z = {ground_z}: {footprint:?}");
    Ok(footprint)
}

#[derive(Debug, Serialize, Deserialize)]
struct WorldPoint {
    x: f64,
    y: f64,
    z: f64,
}

/// Writes world points as CSV with an `x,y,z` header, one row per column.
pub fn export_world_points<P: AsRef<Path>>(
    path: P,
    points_3d: &Matrix3xX<f64>,
) -> Result<(), CameraModelError> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for point in points_3d.column_iter() {
        writer.serialize(WorldPoint {
            x: point[0],
            y: point[1],
            z: point[2],
        })?;
    }
    writer.flush()?;

    log::info!(
        "Exported {} world points to {}",
        points_3d.ncols(),
        path.as_ref().display()
    );
    Ok(())
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProjectionError {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
}

impl fmt::Debug for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Projection Error [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {} ]",
            self.rmse, self.min, self.max, self.mean, self.stddev, self.median
        )
    }
}

/// Pixel residuals of a model against surveyed control points.
///
/// Control points that cannot be projected are skipped.
///
/// # Errors
///
/// * [`CameraModelError::LengthMismatch`]: the point sets differ in size.
/// * [`CameraModelError::InvalidParams`]: no control point could be projected.
pub fn compute_reprojection_error(
    m: &MVector,
    points_3d: &Matrix3xX<f64>,
    points_2d: &Matrix2xX<f64>,
) -> Result<ProjectionError, CameraModelError> {
    validation::check_same_len("points_2d", points_3d.ncols(), points_2d.ncols())?;

    let errors: Vec<f64> = points_3d
        .column_iter()
        .zip(points_2d.column_iter())
        .filter_map(|(p3d, p2d)| {
            m.project(&p3d.into_owned())
                .ok()
                .map(|projected| (projected - p2d).norm())
        })
        .collect();

    if errors.is_empty() {
        return Err(CameraModelError::InvalidParams(
            "No control point could be projected".to_string(),
        ));
    }

    let n = errors.len() as f64;
    let mean = errors.iter().sum::<f64>() / n;
    let variance = errors.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let rmse = (errors.iter().map(|x| x.powi(2)).sum::<f64>() / n).sqrt();
    let min = errors.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = errors.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

    let mut sorted_errors = errors;
    sorted_errors.sort_by(f64::total_cmp);
    let mid = sorted_errors.len() / 2;
    let median = if sorted_errors.len() % 2 == 0 {
        (sorted_errors[mid - 1] + sorted_errors[mid]) / 2.0
    } else {
        sorted_errors[mid]
    };

    Ok(ProjectionError {
        rmse,
        min,
        max,
        mean,
        stddev: variance.sqrt(),
        median,
    })
}
