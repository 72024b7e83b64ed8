//! Observers that wire session signals to the billboard view.

use bevy::prelude::*;

use crate::components::BillboardAnchor;
use crate::components::BillboardView;
use crate::events::BillboardRendered;
use crate::events::CameraFrameUpdated;
use crate::events::DetectBillboard;
use crate::events::RemovalReason;
use crate::events::SessionError;
use crate::events::SessionFailed;
use crate::events::SessionInterrupted;
use crate::events::SessionInterruptionEnded;
use crate::pipeline::BillboardConfig;
use crate::pipeline::RectangleDetectorHandle;
use crate::pipeline::remove_billboard;
use crate::pipeline::report_failure;
use crate::pipeline::spawn_detection;
use crate::projection::DetectionError;

/// Observer for `CameraFrameUpdated` - keeps the latest frame for hit-testing
pub fn on_camera_frame_updated(
    update: On<CameraFrameUpdated>,
    mut view_query: Query<&mut BillboardView>,
) {
    let Ok(mut view) = view_query.get_mut(update.entity) else {
        return;
    };
    view.current_frame = Some(update.frame.clone());
}

/// Observer for `DetectBillboard` - starts a background detection against the
/// view's current frame.
pub fn on_detect_billboard(
    detect: On<DetectBillboard>,
    mut commands: Commands,
    config: Res<BillboardConfig>,
    detector: Option<Res<RectangleDetectorHandle>>,
    view_query: Query<&BillboardView>,
) {
    let view_entity = detect.entity;
    let Ok(view) = view_query.get(view_entity) else {
        warn!("DetectBillboard: {view_entity:?} has no BillboardView");
        return;
    };

    let Some(frame) = view.current_frame.clone() else {
        report_failure(
            &mut commands,
            &config,
            view_entity,
            DetectionError::NoCameraFrame,
        );
        return;
    };

    let Some(detector) = detector else {
        warn!("DetectBillboard: no RectangleDetectorHandle resource registered");
        report_failure(&mut commands, &config, view_entity, DetectionError::NoDetector);
        return;
    };

    debug!("DetectBillboard: starting detection for {view_entity:?}");
    spawn_detection(&mut commands, view_entity, detector.0.clone(), frame);
}

/// Observer that answers the renderer's request for an anchor's geometry.
///
/// Only the view's pending anchor receives a quad; any other anchor gets nothing.
pub fn on_billboard_anchor_added(
    add: On<Add, BillboardAnchor>,
    mut commands: Commands,
    anchor_query: Query<&BillboardAnchor>,
    mut view_query: Query<&mut BillboardView>,
    meshes: Option<ResMut<Assets<Mesh>>>,
) {
    let anchor = add.entity;
    let Ok(&BillboardAnchor { view: view_entity }) = anchor_query.get(anchor) else {
        return;
    };
    let Ok(mut view) = view_query.get_mut(view_entity) else {
        return;
    };
    let Some(container) = view.billboard.as_mut() else {
        return;
    };
    let Some(quad) = container.geometry_for(anchor) else {
        debug!("No billboard geometry for anchor {anchor:?}");
        return;
    };

    let mut node = commands.spawn((
        Name::new("Billboard"),
        quad,
        Transform::IDENTITY,
        Visibility::default(),
        ChildOf(anchor),
    ));
    if let Some(mut meshes) = meshes {
        node.insert(Mesh3d(meshes.add(Rectangle::new(quad.width, quad.height))));
    }
    let node = node.id();

    container.node = Some(node);

    commands.trigger(BillboardRendered {
        view_entity,
        anchor,
        node,
    });
}

/// Observer that unregisters a view's billboard anchor when the view goes away.
pub fn on_billboard_view_removed(
    remove: On<Remove, BillboardView>,
    mut commands: Commands,
    view_query: Query<&BillboardView>,
) {
    let Ok(view) = view_query.get(remove.entity) else {
        return;
    };
    let Some(container) = view.billboard() else {
        return;
    };

    debug!(
        "View {:?} removed: despawning billboard anchor {:?}",
        remove.entity, container.anchor
    );
    commands.entity(container.anchor).try_despawn();
}

/// Observer for `SessionInterrupted` - removes the billboard
pub fn on_session_interrupted(
    interrupted: On<SessionInterrupted>,
    mut commands: Commands,
    mut view_query: Query<&mut BillboardView>,
) {
    let view_entity = interrupted.entity;
    let Ok(mut view) = view_query.get_mut(view_entity) else {
        return;
    };

    if remove_billboard(
        &mut commands,
        view_entity,
        &mut view,
        RemovalReason::Interrupted,
    ) {
        info!("Session interrupted: billboard removed for {view_entity:?}");
    }
}

/// Observer for `SessionInterruptionEnded`
pub fn on_session_interruption_ended(ended: On<SessionInterruptionEnded>) {
    info!("Session interruption ended for {:?}", ended.entity);
}

/// Observer for `SessionFailed` - records the error and re-announces it
pub fn on_session_failed(
    failed: On<SessionFailed>,
    mut commands: Commands,
    mut view_query: Query<&mut BillboardView>,
) {
    let view_entity = failed.entity;
    error!("Session failed for {view_entity:?}: {}", failed.message);

    if let Ok(mut view) = view_query.get_mut(view_entity) {
        view.last_session_error = Some(failed.message.clone());
    }

    commands.trigger(SessionError {
        view_entity,
        message: failed.message.clone(),
    });
}
