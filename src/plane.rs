//! Rectangular plane derivation from four world-space corner transforms.
//!
//! The corners come from feature-point hit-tests, so they are noisy and only
//! approximately coplanar. The plane orientation is built from the averaged
//! horizontal and vertical edges rather than from any single corner.

use bevy::prelude::*;
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Smallest edge length (in metres) accepted for a billboard.
pub const DEFAULT_MIN_EXTENT: f32 = 0.005;
/// Minimum sine of the angle between the horizontal and vertical edges.
pub const DEFAULT_COLLINEARITY_TOLERANCE: f32 = 1.0e-3;

// ============================================================================
// Types
// ============================================================================

/// Identifies one corner of a detected rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl Corner {
    /// Corners in detection order.
    pub const ALL: [Self; 4] = [
        Self::TopLeft,
        Self::TopRight,
        Self::BottomRight,
        Self::BottomLeft,
    ];
}

/// Four values laid out as the corners of a rectangle.
///
/// Array conversions always use the order top-left, top-right, bottom-right,
/// bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectCorners<T> {
    pub top_left:     T,
    pub top_right:    T,
    pub bottom_right: T,
    pub bottom_left:  T,
}

impl<T> RectCorners<T> {
    pub const fn new(top_left: T, top_right: T, bottom_right: T, bottom_left: T) -> Self {
        Self {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        }
    }

    pub fn from_array([top_left, top_right, bottom_right, bottom_left]: [T; 4]) -> Self {
        Self::new(top_left, top_right, bottom_right, bottom_left)
    }

    pub fn into_array(self) -> [T; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    pub const fn get(&self, corner: Corner) -> &T {
        match corner {
            Corner::TopLeft => &self.top_left,
            Corner::TopRight => &self.top_right,
            Corner::BottomRight => &self.bottom_right,
            Corner::BottomLeft => &self.bottom_left,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> RectCorners<U> {
        RectCorners::from_array(self.into_array().map(f))
    }
}

/// Reasons a set of corners cannot form a billboard plane.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PlaneError {
    #[error("corner positions contain non-finite values")]
    NonFinite,
    #[error("rectangle is degenerate (width {width:.4}, height {height:.4})")]
    Degenerate { width: f32, height: f32 },
    #[error("rectangle edges are collinear")]
    Collinear,
}

/// A rectangle in world space resolved from four hit-test corners.
///
/// `center` sits at the centroid of the corners. Its local +X runs from the left
/// edge to the right edge, local +Y from the bottom edge to the top edge, and
/// local +Z is the surface normal, which matches the orientation of a Bevy
/// `Rectangle` mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct RectangularPlane {
    pub corners: RectCorners<Transform>,
    pub center:  Transform,
    pub width:   f32,
    pub height:  f32,
}

impl RectangularPlane {
    /// Builds a plane with the default tolerances.
    pub fn from_corners(corners: RectCorners<Transform>) -> Result<Self, PlaneError> {
        Self::new(
            corners,
            DEFAULT_MIN_EXTENT,
            DEFAULT_COLLINEARITY_TOLERANCE,
        )
    }

    /// Builds a plane, rejecting rectangles with an edge shorter than `min_extent`
    /// or whose edges are closer to parallel than `collinearity_tolerance` (as the
    /// sine of the angle between them).
    pub fn new(
        corners: RectCorners<Transform>,
        min_extent: f32,
        collinearity_tolerance: f32,
    ) -> Result<Self, PlaneError> {
        let RectCorners {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        } = corners.map(|transform| transform.translation);

        if ![top_left, top_right, bottom_right, bottom_left]
            .iter()
            .all(|p| p.is_finite())
        {
            return Err(PlaneError::NonFinite);
        }

        let width = top_left.distance(top_right);
        let height = top_left.distance(bottom_left);
        if width < min_extent || height < min_extent {
            return Err(PlaneError::Degenerate { width, height });
        }

        // Sum opposite edges so a single noisy corner does not dominate the axes
        let right = (top_right - top_left) + (bottom_right - bottom_left);
        let up = (top_left - bottom_left) + (top_right - bottom_right);
        let normal = right.cross(up);

        // Zero-length edge sums make the sine NaN
        let sine = normal.length() / (right.length() * up.length());
        if sine.is_nan() || sine < collinearity_tolerance {
            return Err(PlaneError::Collinear);
        }

        let x_axis = right.normalize();
        let z_axis = normal.normalize();
        let y_axis = z_axis.cross(x_axis);
        let rotation = Quat::from_mat3(&Mat3::from_cols(x_axis, y_axis, z_axis)).normalize();

        let centroid = (top_left + top_right + bottom_right + bottom_left) * 0.25;

        Ok(Self {
            corners,
            center: Transform::from_translation(centroid).with_rotation(rotation),
            width,
            height,
        })
    }

    /// Surface normal in world space.
    pub fn normal(&self) -> Vec3 { self.center.rotation * Vec3::Z }

    /// Quad size as `(width, height)`.
    pub const fn size(&self) -> Vec2 { Vec2::new(self.width, self.height) }

    /// World-space corner positions in detection order.
    pub fn corner_positions(&self) -> [Vec3; 4] {
        self.corners.map(|transform| transform.translation).into_array()
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_3;

    use super::*;

    const EPSILON: f32 = 1.0e-5;

    fn corners_at(points: [Vec3; 4]) -> RectCorners<Transform> {
        RectCorners::from_array(points.map(Transform::from_translation))
    }

    fn unit_square() -> RectCorners<Transform> {
        corners_at([
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ])
    }

    #[test]
    fn unit_square_resolves_to_unit_plane() {
        let plane = RectangularPlane::from_corners(unit_square()).unwrap();

        assert!((plane.width - 1.0).abs() < EPSILON);
        assert!((plane.height - 1.0).abs() < EPSILON);
        assert!(
            plane
                .center
                .translation
                .abs_diff_eq(Vec3::new(0.5, 0.5, 0.0), EPSILON)
        );
    }

    #[test]
    fn center_is_centroid_of_irregular_quad() {
        let points = [
            Vec3::new(-0.4, 1.9, -2.0),
            Vec3::new(0.5, 2.0, -2.1),
            Vec3::new(0.6, 1.1, -2.0),
            Vec3::new(-0.5, 1.0, -1.9),
        ];
        let plane = RectangularPlane::from_corners(corners_at(points)).unwrap();

        let centroid = points.iter().sum::<Vec3>() / 4.0;
        assert!(plane.center.translation.abs_diff_eq(centroid, EPSILON));
        assert!(plane.width > 0.0);
        assert!(plane.height > 0.0);
    }

    #[test]
    fn orientation_follows_rectangle_edges() {
        // A poster on a wall facing +Z, corners listed top-left first
        let plane = RectangularPlane::from_corners(corners_at([
            Vec3::new(-1.0, 2.0, 0.0),
            Vec3::new(1.0, 2.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ]))
        .unwrap();

        assert!((plane.width - 2.0).abs() < EPSILON);
        assert!((plane.height - 1.0).abs() < EPSILON);
        assert!((plane.center.rotation * Vec3::X).abs_diff_eq(Vec3::X, EPSILON));
        assert!((plane.center.rotation * Vec3::Y).abs_diff_eq(Vec3::Y, EPSILON));
        assert!(plane.normal().abs_diff_eq(Vec3::Z, EPSILON));
    }

    #[test]
    fn rotated_rectangle_keeps_its_size() {
        let rotation = Quat::from_euler(EulerRot::YXZ, FRAC_PI_3, -0.4, 0.2);
        let offset = Vec3::new(3.0, -1.0, 2.5);
        let local = [
            Vec3::new(-0.3, 0.2, 0.0),
            Vec3::new(0.3, 0.2, 0.0),
            Vec3::new(0.3, -0.2, 0.0),
            Vec3::new(-0.3, -0.2, 0.0),
        ];
        let plane =
            RectangularPlane::from_corners(corners_at(local.map(|p| rotation * p + offset)))
                .unwrap();

        assert!((plane.width - 0.6).abs() < EPSILON);
        assert!((plane.height - 0.4).abs() < EPSILON);
        assert!(plane.center.translation.abs_diff_eq(offset, EPSILON));
        assert!(plane.normal().abs_diff_eq(rotation * Vec3::Z, 1.0e-4));
    }

    #[test]
    fn coincident_corners_are_degenerate() {
        let result = RectangularPlane::from_corners(corners_at([
            Vec3::ZERO,
            Vec3::ZERO,
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ]));

        assert!(matches!(result, Err(PlaneError::Degenerate { .. })));
    }

    #[test]
    fn tiny_rectangle_is_degenerate() {
        let result = RectangularPlane::from_corners(corners_at([
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.001, 0.0, 0.0),
            Vec3::new(0.001, 0.5, 0.0),
            Vec3::new(0.0, 0.5, 0.0),
        ]));

        assert!(matches!(result, Err(PlaneError::Degenerate { .. })));
    }

    #[test]
    fn collinear_corners_are_rejected() {
        let result = RectangularPlane::from_corners(corners_at([
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(3.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
        ]));

        assert_eq!(result, Err(PlaneError::Collinear));
    }

    #[test]
    fn twisted_quad_with_cancelling_edges_is_collinear() {
        // Horizontal edges point in opposite directions, so their sum vanishes
        let result = RectangularPlane::from_corners(corners_at([
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
        ]));

        assert_eq!(result, Err(PlaneError::Collinear));
    }

    #[test]
    fn non_finite_corner_is_rejected() {
        let mut corners = unit_square();
        corners.bottom_left.translation.x = f32::NAN;

        assert_eq!(
            RectangularPlane::from_corners(corners),
            Err(PlaneError::NonFinite)
        );
    }

    #[test]
    fn corner_order_round_trips_through_arrays() {
        let corners = RectCorners::from_array([1, 2, 3, 4]);

        assert_eq!(*corners.get(Corner::TopRight), 2);
        assert_eq!(*corners.get(Corner::BottomLeft), 4);
        assert_eq!(corners.into_array(), [1, 2, 3, 4]);
    }
}
