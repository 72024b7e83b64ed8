//! Background detection tasks and the billboard state transitions they drive.
//!
//! Detection and hit-testing run on the `AsyncComputeTaskPool`. Finished tasks are
//! polled from `Update`, where the plane is derived and the anchor and node entities
//! are mutated, so scene changes stay serialized with rendering.

use std::sync::Arc;

use bevy::prelude::*;
use bevy::tasks::AsyncComputeTaskPool;
use bevy::tasks::Task;
use bevy::tasks::block_on;
use bevy::tasks::futures_lite::future;

use crate::components::BillboardAnchor;
use crate::components::BillboardContainer;
use crate::components::BillboardView;
use crate::components::CornerMarker;
use crate::events::BillboardPlaced;
use crate::events::BillboardRemoved;
use crate::events::DetectionFailed;
use crate::events::RemovalReason;
use crate::plane::Corner;
use crate::plane::DEFAULT_COLLINEARITY_TOLERANCE;
use crate::plane::DEFAULT_MIN_EXTENT;
use crate::plane::RectCorners;
use crate::plane::RectangularPlane;
use crate::projection::CameraFrame;
use crate::projection::DetectionError;
use crate::projection::RectangleDetector;
use crate::projection::resolve_corners;

/// Configuration for billboard resolution
#[derive(Resource, Reflect, Debug, Clone)]
#[reflect(Resource)]
pub struct BillboardConfig {
    /// Shortest accepted billboard edge, in metres
    pub min_extent:             f32,
    /// Minimum sine of the angle between the rectangle's edges
    pub collinearity_tolerance: f32,
    /// Emit `DetectionFailed` for failed attempts instead of only logging them
    pub report_failures:        bool,
    /// Place a `CornerMarker` under the anchor at each hit corner
    pub corner_markers:         bool,
}

impl Default for BillboardConfig {
    fn default() -> Self {
        Self {
            min_extent:             DEFAULT_MIN_EXTENT,
            collinearity_tolerance: DEFAULT_COLLINEARITY_TOLERANCE,
            report_failures:        true,
            corner_markers:         true,
        }
    }
}

/// The rectangle detector used for every `DetectBillboard` request.
#[derive(Resource, Clone)]
pub struct RectangleDetectorHandle(pub Arc<dyn RectangleDetector>);

impl RectangleDetectorHandle {
    pub fn new(detector: impl RectangleDetector + 'static) -> Self { Self(Arc::new(detector)) }
}

/// An in-flight detection for `view`, spawned as its own entity.
#[derive(Component)]
pub struct DetectionTask {
    pub view: Entity,
    task:     Task<Result<RectCorners<Transform>, DetectionError>>,
}

/// Starts detection and hit-testing for `view` on the async compute pool.
///
/// Overlapping requests are not coalesced; each one completes independently and the
/// last to finish owns the billboard.
pub fn spawn_detection(
    commands: &mut Commands,
    view: Entity,
    detector: Arc<dyn RectangleDetector>,
    frame: Arc<dyn CameraFrame>,
) {
    let task = AsyncComputeTaskPool::get()
        .spawn(async move { resolve_corners(detector.as_ref(), frame.as_ref()) });

    commands.spawn((Name::new("BillboardDetection"), DetectionTask { view, task }));
}

/// System that collects finished detection tasks and applies their results.
pub fn poll_detection_tasks(
    mut commands: Commands,
    config: Res<BillboardConfig>,
    mut task_query: Query<(Entity, &mut DetectionTask)>,
    mut view_query: Query<&mut BillboardView>,
) {
    for (task_entity, mut detection) in &mut task_query {
        let Some(result) = block_on(future::poll_once(&mut detection.task)) else {
            continue;
        };
        commands.entity(task_entity).despawn();

        let view_entity = detection.view;
        let Ok(mut view) = view_query.get_mut(view_entity) else {
            debug!("Detection finished for missing view {view_entity:?}");
            continue;
        };

        let plane = result.and_then(|corners| {
            RectangularPlane::new(corners, config.min_extent, config.collinearity_tolerance)
                .map_err(DetectionError::from)
        });

        match plane {
            Ok(plane) => place_billboard(&mut commands, &config, view_entity, &mut view, plane),
            Err(reason) => report_failure(&mut commands, &config, view_entity, reason),
        }
    }
}

/// Logs a failed attempt and, when configured, emits `DetectionFailed`.
/// The view's current billboard is left as it was.
pub fn report_failure(
    commands: &mut Commands,
    config: &BillboardConfig,
    view_entity: Entity,
    reason: DetectionError,
) {
    info!("Billboard detection failed for {view_entity:?}: {reason}");
    if config.report_failures {
        commands.trigger(DetectionFailed {
            view_entity,
            reason,
        });
    }
}

/// Replaces the view's billboard with a new one anchored at `plane`'s center.
///
/// The previous anchor's despawn is queued before the new anchor's spawn, so the
/// two are never registered at the same time.
pub fn place_billboard(
    commands: &mut Commands,
    config: &BillboardConfig,
    view_entity: Entity,
    view: &mut BillboardView,
    plane: RectangularPlane,
) {
    remove_billboard(commands, view_entity, view, RemovalReason::Superseded);

    let anchor = commands
        .spawn((
            Name::new("BillboardAnchor"),
            BillboardAnchor { view: view_entity },
            plane.center,
            Visibility::default(),
        ))
        .id();

    if config.corner_markers {
        for corner in Corner::ALL {
            let local = relative_transform(&plane.center, plane.corners.get(corner));
            commands.spawn((CornerMarker { corner }, local, ChildOf(anchor)));
        }
    }

    info!(
        "New billboard for {view_entity:?}: {:.3} x {:.3} at {:.3?}",
        plane.width, plane.height, plane.center.translation
    );

    let (width, height) = (plane.width, plane.height);
    view.billboard = Some(BillboardContainer::new(plane, anchor));

    commands.trigger(BillboardPlaced {
        view_entity,
        anchor,
        width,
        height,
    });
}

/// Unregisters the view's billboard anchor, taking the node and markers with it.
/// Returns `false` when the view had no billboard.
pub fn remove_billboard(
    commands: &mut Commands,
    view_entity: Entity,
    view: &mut BillboardView,
    reason: RemovalReason,
) -> bool {
    let Some(container) = view.billboard.take() else {
        return false;
    };

    commands.entity(container.anchor).despawn();
    debug!(
        "Removed billboard anchor {:?} ({reason:?})",
        container.anchor
    );

    commands.trigger(BillboardRemoved {
        view_entity,
        anchor: container.anchor,
        reason,
    });
    true
}

/// Expresses `child` (world space) in `parent`'s local space, ignoring scale.
fn relative_transform(parent: &Transform, child: &Transform) -> Transform {
    let inverse = parent.rotation.inverse();
    Transform::from_translation(inverse * (child.translation - parent.translation))
        .with_rotation(inverse * child.rotation)
}
