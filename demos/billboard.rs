//! Simulates an AR session placing a billboard on a poster using `bevy_ar_billboard`.
//!
//! A simulated tracking camera looks at a wall with a poster; the poster's corners are
//! the only reconstructed feature points. Orbit the scene with the mouse.
//!
//! - Press 'Space' to detect the poster and place a billboard
//! - Press 'M' to move the simulated camera, producing a new frame
//! - Press 'I' to interrupt the session, 'R' to resume it
//! - Press 'D' to toggle the billboard gizmos

use bevy::prelude::*;
use bevy_ar_billboard::BillboardGizmo;
use bevy_ar_billboard::BillboardPlaced;
use bevy_ar_billboard::BillboardPlugin;
use bevy_ar_billboard::BillboardRemoved;
use bevy_ar_billboard::BillboardRendered;
use bevy_ar_billboard::BillboardView;
use bevy_ar_billboard::BillboardVisualizationPlugin;
use bevy_ar_billboard::CameraFrameUpdated;
use bevy_ar_billboard::DetectBillboard;
use bevy_ar_billboard::DetectionFailed;
use bevy_ar_billboard::FeaturePointFrame;
use bevy_ar_billboard::FixedRectangleDetector;
use bevy_ar_billboard::Geofence;
use bevy_ar_billboard::GeofencePlugin;
use bevy_ar_billboard::RectangleDetectorHandle;
use bevy_ar_billboard::RectangleObservation;
use bevy_ar_billboard::RegionEntered;
use bevy_ar_billboard::SessionInterrupted;
use bevy_ar_billboard::SessionInterruptionEnded;
use bevy_ar_billboard::geofence::AuthorizationStatus;
use bevy_ar_billboard::geofence::Coordinate;
use bevy_ar_billboard::geofence::InMemoryRegionMonitor;
use bevy_ar_billboard::geofence::RegionState;
use bevy_brp_extras::BrpExtrasPlugin;
use bevy_panorbit_camera::PanOrbitCamera;
use bevy_panorbit_camera::PanOrbitCameraPlugin;

const POSTER_CENTER: Vec3 = Vec3::new(0.0, 1.5, 0.0);
const POSTER_SIZE: Vec2 = Vec2::new(1.2, 0.8);
const TRACKING_FOV: f32 = 1.0;
const TRACKING_ASPECT: f32 = 0.75;
const TRACKING_POSITIONS: [Vec3; 2] = [Vec3::new(0.0, 1.6, 3.0), Vec3::new(1.2, 1.4, 2.6)];
const STORE: Coordinate = Coordinate::new(37.3349, -122.0090);

fn main() {
    App::new()
        .add_plugins((
            DefaultPlugins,
            PanOrbitCameraPlugin,
            BillboardPlugin,
            BillboardVisualizationPlugin,
            GeofencePlugin,
            BrpExtrasPlugin::default(),
        ))
        .insert_resource(Geofence::new(InMemoryRegionMonitor::new(
            AuthorizationStatus::NotDetermined,
        )))
        .init_resource::<TrackingPose>()
        .add_systems(Startup, (setup, start_geofence))
        .add_systems(Update, (handle_keys, toggle_debug_visualization))
        .add_observer(log_placed)
        .add_observer(log_rendered)
        .add_observer(log_removed)
        .add_observer(log_failed)
        .add_observer(log_region_entered)
        .run();
}

#[derive(Resource, Default)]
struct TrackingPose(usize);

#[derive(Resource)]
struct ArView(Entity);

fn poster_corners() -> [Vec3; 4] {
    let half = POSTER_SIZE * 0.5;
    [
        POSTER_CENTER + Vec3::new(-half.x, half.y, 0.0),
        POSTER_CENTER + Vec3::new(half.x, half.y, 0.0),
        POSTER_CENTER + Vec3::new(half.x, -half.y, 0.0),
        POSTER_CENTER + Vec3::new(-half.x, -half.y, 0.0),
    ]
}

/// Builds a simulated frame from the tracking camera at `position` and a detector that
/// reports the poster as seen from there.
fn simulate_frame(position: Vec3) -> (FeaturePointFrame, FixedRectangleDetector) {
    let camera = Transform::from_translation(position).looking_at(POSTER_CENTER, Vec3::Y);
    let frame = FeaturePointFrame::new(camera, TRACKING_FOV, TRACKING_ASPECT)
        .with_feature_points(poster_corners());

    let observations = poster_corners()
        .map(|corner| frame.project(corner))
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .map(|points| RectangleObservation::new(points[0], points[1], points[2], points[3]));

    (frame, FixedRectangleDetector::new(observations))
}

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn((
        Name::new("Wall"),
        Mesh3d(meshes.add(Cuboid::new(4.0, 3.0, 0.1))),
        MeshMaterial3d(materials.add(Color::srgb(0.55, 0.55, 0.6))),
        Transform::from_xyz(0.0, 1.5, -0.06),
    ));
    commands.spawn((
        Name::new("Poster"),
        Mesh3d(meshes.add(Rectangle::new(POSTER_SIZE.x, POSTER_SIZE.y))),
        MeshMaterial3d(materials.add(Color::srgb(0.9, 0.3, 0.2))),
        Transform::from_translation(POSTER_CENTER - Vec3::Z * 0.005),
    ));
    commands.spawn((
        DirectionalLight::default(),
        Transform::from_xyz(2.0, 4.0, 3.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    commands.spawn((
        PanOrbitCamera {
            focus: POSTER_CENTER,
            radius: Some(5.0),
            ..default()
        },
        Transform::from_xyz(2.0, 2.5, 5.0),
    ));

    let view = commands.spawn((Name::new("ArView"), BillboardView::default())).id();
    commands.insert_resource(ArView(view));

    let (frame, detector) = simulate_frame(TRACKING_POSITIONS[0]);
    commands.insert_resource(RectangleDetectorHandle::new(detector));
    commands.trigger(CameraFrameUpdated::new(view, frame));
}

fn start_geofence(mut geofence: ResMut<Geofence>) {
    let tracker = geofence.tracker_mut();
    tracker.initialize();
    if let Err(error) = tracker.start_monitoring(STORE, 150.0, "store") {
        warn!("Geofence unavailable: {error}");
        return;
    }
    // The simulated device starts inside the store's region
    tracker.handle_region_state("store", RegionState::Inside);
}

fn handle_keys(
    mut commands: Commands,
    keys: Res<ButtonInput<KeyCode>>,
    view: Res<ArView>,
    mut pose: ResMut<TrackingPose>,
) {
    let view = view.0;

    if keys.just_pressed(KeyCode::Space) {
        commands.trigger(DetectBillboard { entity: view });
    }
    if keys.just_pressed(KeyCode::KeyM) {
        pose.0 = (pose.0 + 1) % TRACKING_POSITIONS.len();
        let (frame, detector) = simulate_frame(TRACKING_POSITIONS[pose.0]);
        commands.insert_resource(RectangleDetectorHandle::new(detector));
        commands.trigger(CameraFrameUpdated::new(view, frame));
        info!("Tracking camera moved to {:?}", TRACKING_POSITIONS[pose.0]);
    }
    if keys.just_pressed(KeyCode::KeyI) {
        commands.trigger(SessionInterrupted { entity: view });
    }
    if keys.just_pressed(KeyCode::KeyR) {
        commands.trigger(SessionInterruptionEnded { entity: view });
    }
}

fn toggle_debug_visualization(
    keys: Res<ButtonInput<KeyCode>>,
    mut config_store: ResMut<GizmoConfigStore>,
) {
    if keys.just_pressed(KeyCode::KeyD) {
        let (config, _) = config_store.config_mut::<BillboardGizmo>();
        config.enabled = !config.enabled;
    }
}

fn log_placed(placed: On<BillboardPlaced>) {
    info!(
        "Billboard placed: anchor={:?} size={:.2}x{:.2}",
        placed.anchor, placed.width, placed.height
    );
}

fn log_rendered(rendered: On<BillboardRendered>) {
    info!("Billboard rendered: node={:?}", rendered.node);
}

fn log_removed(removed: On<BillboardRemoved>) {
    info!(
        "Billboard removed: anchor={:?} reason={:?}",
        removed.anchor, removed.reason
    );
}

fn log_failed(failed: On<DetectionFailed>) {
    warn!("Detection failed: {}", failed.reason);
}

fn log_region_entered(entered: On<RegionEntered>) {
    info!("Welcome! Entered region {}", entered.region_id);
}
