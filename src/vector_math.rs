//! Frame helpers for terrain-conformed poses.
//!
//! A pose frame is a column-major [`Mat4`] whose first three columns are the
//! forward, left and up (terrain normal) axes and whose last column is the
//! position on the surface.
use glam::{Mat4, Vec3};

/// Returns the unit surface normal for a height gradient.
///
/// `slope_x` and `slope_y` are the partial derivatives of elevation along
/// the ground axes. Non-finite gradients yield `None`.
///
/// # Examples
/// ```
/// use trundle::vector_math::surface_normal;
/// let normal = surface_normal(0.0, 0.0).unwrap();
/// assert!((normal.z - 1.0).abs() < f32::EPSILON);
/// ```
#[must_use]
pub fn surface_normal(slope_x: f32, slope_y: f32) -> Option<Vec3> {
    let normal = Vec3::new(-slope_x, -slope_y, 1.0);
    if !normal.is_finite() {
        return None;
    }
    normal.try_normalize()
}

/// Builds the frame of an agent standing at `position` with the given
/// heading on ground whose normal is `normal`.
///
/// The heading direction is projected onto the tangent plane so the agent
/// always faces along the ground. Returns `None` for non-finite input or
/// when the heading is parallel to the normal.
///
/// # Examples
/// ```
/// use glam::Vec3;
/// use trundle::vector_math::{conformed_frame, forward_axis, translation};
/// let frame = conformed_frame(Vec3::new(2.0, 3.0, 0.0), Vec3::Z, 0.0).unwrap();
/// assert_eq!(forward_axis(&frame), Vec3::X);
/// assert_eq!(translation(&frame), Vec3::new(2.0, 3.0, 0.0));
/// ```
#[must_use]
pub fn conformed_frame(position: Vec3, normal: Vec3, heading: f32) -> Option<Mat4> {
    if !(position.is_finite() && normal.is_finite() && heading.is_finite()) {
        return None;
    }
    let (sin, cos) = heading.sin_cos();
    let planar = Vec3::new(cos, sin, 0.0);
    let forward = (planar - normal * planar.dot(normal)).try_normalize()?;
    let left = normal.cross(forward);
    Some(Mat4::from_cols(
        forward.extend(0.0),
        left.extend(0.0),
        normal.extend(0.0),
        position.extend(1.0),
    ))
}

/// Forward (heading) axis of a pose frame.
#[must_use]
pub fn forward_axis(frame: &Mat4) -> Vec3 {
    frame.x_axis.truncate()
}

/// Up axis (terrain normal) of a pose frame.
#[must_use]
pub fn up_axis(frame: &Mat4) -> Vec3 {
    frame.z_axis.truncate()
}

/// Position encoded in a pose frame.
#[must_use]
pub fn translation(frame: &Mat4) -> Vec3 {
    frame.w_axis.truncate()
}
