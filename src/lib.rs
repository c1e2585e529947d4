//! DLT Tools Library
//!
//! Camera geometry for mapping oblique imagery between pixel and world
//! coordinates with the 11 parameter Direct Linear Transformation (DLT).
//! The library provides:
//! - Radial lens distortion correction of raw pixel coordinates
//! - Construction of the DLT model (M-vector) from pitch/yaw/roll, field of
//!   view, camera position and image parameters
//! - Inversion of the DLT model to world coordinates given one known coordinate
//!
//! Every operation is a pure function of its inputs and safe to call from
//! several threads at once.

pub mod camera;
pub mod geometry;

// Re-export commonly used types
pub use camera::{
    undistort_uv, CameraModel, CameraModelError, DistortionModel, ImageParams, MVector,
    MountOffset, Orientation, Resolution,
};

pub use geometry::{find_xyz, ground_footprint, KnownAxis};
