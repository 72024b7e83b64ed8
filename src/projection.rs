//! Rectangle-to-3D projection.
//!
//! A rectangle observed in image space is turned into four world-space corner
//! transforms by hit-testing each corner against the frame's reconstructed feature
//! points. The detection model and the camera frame are external; they are reached
//! through the `RectangleDetector` and `CameraFrame` traits.

use bevy::prelude::*;
use thiserror::Error;

use crate::plane::PlaneError;
use crate::plane::RectCorners;

/// Default distance (in metres) a feature point may sit from a hit-test ray.
pub const DEFAULT_HIT_RADIUS: f32 = 0.02;

// ============================================================================
// Types
// ============================================================================

/// Reasons a detection attempt ends without a billboard.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("no camera frame available")]
    NoCameraFrame,
    #[error("no rectangle detector registered")]
    NoDetector,
    #[error("rectangle detection request failed: {0}")]
    Request(String),
    #[error("rectangle detection produced no result")]
    NoRectangle,
    #[error("only {hits} of 4 corners hit reconstructable geometry")]
    MissedHitTest { hits: usize },
    #[error(transparent)]
    Plane(#[from] PlaneError),
}

/// A rectangle found in a camera image.
///
/// Corner points are normalized image coordinates: origin at the top-left of the
/// image, x to the right, y downwards, both in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectangleObservation {
    pub corners:    RectCorners<Vec2>,
    pub confidence: f32,
}

impl RectangleObservation {
    pub const fn new(
        top_left: Vec2,
        top_right: Vec2,
        bottom_right: Vec2,
        bottom_left: Vec2,
    ) -> Self {
        Self {
            corners:    RectCorners::new(top_left, top_right, bottom_right, bottom_left),
            confidence: 1.0,
        }
    }

    pub const fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }
}

/// A captured camera frame with the tracking data needed for hit-testing.
pub trait CameraFrame: Send + Sync {
    /// Casts a ray through `image_point` (normalized, top-left origin) against the
    /// frame's feature points. Results are ordered nearest first; an empty result
    /// means the ray missed all reconstructed geometry.
    fn hit_test_feature_points(&self, image_point: Vec2) -> Vec<Transform>;
}

/// Finds rectangles in a camera frame.
pub trait RectangleDetector: Send + Sync {
    fn detect(&self, frame: &dyn CameraFrame)
    -> Result<Vec<RectangleObservation>, DetectionError>;
}

// ============================================================================
// Projection
// ============================================================================

/// Projects the observation's corners into world space.
///
/// Every corner must hit. Corners whose ray misses are dropped and the attempt
/// fails with the number of corners that did hit.
pub fn project_rectangle(
    observation: &RectangleObservation,
    frame: &dyn CameraFrame,
) -> Result<RectCorners<Transform>, DetectionError> {
    let hits: Vec<Transform> = observation
        .corners
        .into_array()
        .into_iter()
        .filter_map(|point| frame.hit_test_feature_points(point).into_iter().next())
        .collect();

    let hit_count = hits.len();
    let hits: [Transform; 4] = hits
        .try_into()
        .map_err(|_| DetectionError::MissedHitTest { hits: hit_count })?;

    Ok(RectCorners::from_array(hits))
}

/// Runs rectangle detection on `frame` and projects the first observation.
pub fn resolve_corners(
    detector: &dyn RectangleDetector,
    frame: &dyn CameraFrame,
) -> Result<RectCorners<Transform>, DetectionError> {
    let observations = detector.detect(frame)?;
    let Some(observation) = observations.first() else {
        debug!("Rectangle detection produced no result");
        return Err(DetectionError::NoRectangle);
    };

    debug!(
        "Projecting rectangle with confidence {:.2}",
        observation.confidence
    );
    project_rectangle(observation, frame)
}

// ============================================================================
// Software frame
// ============================================================================

/// A camera frame backed by a pinhole camera and a sparse feature-point cloud.
///
/// A hit is reported for each feature point within `hit_radius` of the ray. The hit
/// transform sits on the ray at that feature point's depth, which is how
/// feature-point hit-testing behaves on tracking devices.
#[derive(Debug, Clone)]
pub struct FeaturePointFrame {
    /// Camera pose, looking down its local -Z with +Y up
    pub camera:         Transform,
    /// Vertical field of view in radians
    pub vertical_fov:   f32,
    /// Image width divided by height
    pub aspect_ratio:   f32,
    pub hit_radius:     f32,
    pub feature_points: Vec<Vec3>,
}

impl FeaturePointFrame {
    pub const fn new(camera: Transform, vertical_fov: f32, aspect_ratio: f32) -> Self {
        Self {
            camera,
            vertical_fov,
            aspect_ratio,
            hit_radius: DEFAULT_HIT_RADIUS,
            feature_points: Vec::new(),
        }
    }

    pub fn with_feature_points(mut self, points: impl IntoIterator<Item = Vec3>) -> Self {
        self.feature_points.extend(points);
        self
    }

    pub fn with_hit_radius(mut self, hit_radius: f32) -> Self {
        self.hit_radius = hit_radius;
        self
    }

    fn half_extents(&self) -> Vec2 {
        let half_tan_vfov = (self.vertical_fov * 0.5).tan();
        Vec2::new(half_tan_vfov * self.aspect_ratio, half_tan_vfov)
    }

    /// Returns `(origin, direction)` of the ray through a normalized image point.
    pub fn ray(&self, image_point: Vec2) -> (Vec3, Vec3) {
        let half = self.half_extents();
        let ndc_x = image_point.x.mul_add(2.0, -1.0);
        let ndc_y = image_point.y.mul_add(-2.0, 1.0);
        let local = Vec3::new(ndc_x * half.x, ndc_y * half.y, -1.0);
        (
            self.camera.translation,
            (self.camera.rotation * local).normalize(),
        )
    }

    /// Projects a world point into normalized image coordinates.
    /// Returns `None` for points at or behind the camera. Points outside the field
    /// of view project outside `0.0..=1.0`.
    pub fn project(&self, world: Vec3) -> Option<Vec2> {
        let relative = self.camera.rotation.inverse() * (world - self.camera.translation);
        let depth = -relative.z;
        if depth <= f32::EPSILON {
            return None;
        }

        let half = self.half_extents();
        let ndc_x = relative.x / (depth * half.x);
        let ndc_y = relative.y / (depth * half.y);
        Some(Vec2::new((ndc_x + 1.0) * 0.5, (1.0 - ndc_y) * 0.5))
    }
}

impl CameraFrame for FeaturePointFrame {
    fn hit_test_feature_points(&self, image_point: Vec2) -> Vec<Transform> {
        let (origin, direction) = self.ray(image_point);

        let mut hits: Vec<(f32, Vec3)> = self
            .feature_points
            .iter()
            .filter_map(|point| {
                let distance_along = (*point - origin).dot(direction);
                if distance_along <= 0.0 {
                    return None;
                }
                let on_ray = origin + direction * distance_along;
                (point.distance(on_ray) <= self.hit_radius).then_some((distance_along, on_ray))
            })
            .collect();

        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.into_iter()
            .map(|(_, position)| Transform::from_translation(position))
            .collect()
    }
}

/// A detector that always reports the same observations.
#[derive(Debug, Clone, Default)]
pub struct FixedRectangleDetector {
    pub observations: Vec<RectangleObservation>,
}

impl FixedRectangleDetector {
    pub fn new(observations: impl IntoIterator<Item = RectangleObservation>) -> Self {
        Self {
            observations: observations.into_iter().collect(),
        }
    }
}

impl RectangleDetector for FixedRectangleDetector {
    fn detect(
        &self,
        _frame: &dyn CameraFrame,
    ) -> Result<Vec<RectangleObservation>, DetectionError> {
        Ok(self.observations.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    const EPSILON: f32 = 1.0e-4;

    fn poster_corners() -> [Vec3; 4] {
        [
            Vec3::new(-0.5, 1.5, 0.0),
            Vec3::new(0.5, 1.5, 0.0),
            Vec3::new(0.5, 1.0, 0.0),
            Vec3::new(-0.5, 1.0, 0.0),
        ]
    }

    fn frame_facing_wall() -> FeaturePointFrame {
        let camera =
            Transform::from_xyz(0.0, 1.25, 3.0).looking_at(Vec3::new(0.0, 1.25, 0.0), Vec3::Y);
        FeaturePointFrame::new(camera, FRAC_PI_2 * 0.6, 0.75).with_feature_points(poster_corners())
    }

    fn observation_of(frame: &FeaturePointFrame, corners: [Vec3; 4]) -> RectangleObservation {
        let [tl, tr, br, bl] = corners.map(|c| frame.project(c).unwrap());
        RectangleObservation::new(tl, tr, br, bl)
    }

    #[test]
    fn projected_point_hits_back_onto_feature() {
        let frame = frame_facing_wall();
        let target = poster_corners()[1];
        let image_point = frame.project(target).unwrap();

        let hits = frame.hit_test_feature_points(image_point);

        assert_eq!(hits.len(), 1);
        assert!(hits[0].translation.abs_diff_eq(target, EPSILON));
    }

    #[test]
    fn image_center_projects_along_view_direction() {
        let frame = frame_facing_wall();
        let (origin, direction) = frame.ray(Vec2::splat(0.5));

        assert!(origin.abs_diff_eq(Vec3::new(0.0, 1.25, 3.0), EPSILON));
        assert!(direction.abs_diff_eq(Vec3::NEG_Z, EPSILON));
    }

    #[test]
    fn hits_are_ordered_nearest_first() {
        let frame = frame_facing_wall().with_feature_points([
            Vec3::new(0.0, 1.25, -1.0),
            Vec3::new(0.0, 1.25, 1.0),
        ]);

        let hits = frame.hit_test_feature_points(Vec2::splat(0.5));

        assert_eq!(hits.len(), 2);
        assert!(hits[0].translation.z > hits[1].translation.z);
    }

    #[test]
    fn points_behind_camera_do_not_project() {
        let frame = frame_facing_wall();

        assert!(frame.project(Vec3::new(0.0, 1.25, 5.0)).is_none());
    }

    #[test]
    fn all_four_corners_resolve() {
        let frame = frame_facing_wall();
        let observation = observation_of(&frame, poster_corners());

        let corners = project_rectangle(&observation, &frame).unwrap();

        for (resolved, expected) in corners.into_array().iter().zip(poster_corners()) {
            assert!(resolved.translation.abs_diff_eq(expected, EPSILON));
        }
    }

    #[test]
    fn missing_corner_fails_with_hit_count() {
        let frame = frame_facing_wall();
        let mut corners = poster_corners();
        // No feature point sits here
        corners[2] = Vec3::new(0.9, 0.4, 0.0);
        let observation = observation_of(&frame, corners);

        assert_eq!(
            project_rectangle(&observation, &frame),
            Err(DetectionError::MissedHitTest { hits: 3 })
        );
    }

    #[test]
    fn detector_without_results_reports_no_rectangle() {
        let frame = frame_facing_wall();
        let detector = FixedRectangleDetector::default();

        assert_eq!(
            resolve_corners(&detector, &frame),
            Err(DetectionError::NoRectangle)
        );
    }

    #[test]
    fn first_observation_wins() {
        let frame = frame_facing_wall();
        let good = observation_of(&frame, poster_corners());
        let miss = RectangleObservation::new(Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y);
        let detector = FixedRectangleDetector::new([good, miss]);

        assert!(resolve_corners(&detector, &frame).is_ok());
    }
}
