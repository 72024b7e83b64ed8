use bevy::prelude::*;
use bevy_ar_billboard::Geofence;
use bevy_ar_billboard::GeofencePlugin;
use bevy_ar_billboard::RegionEntered;
use bevy_ar_billboard::RegionExited;
use bevy_ar_billboard::geofence::AuthorizationStatus;
use bevy_ar_billboard::geofence::Coordinate;
use bevy_ar_billboard::geofence::GeofenceError;
use bevy_ar_billboard::geofence::InMemoryRegionMonitor;
use bevy_ar_billboard::geofence::RegionState;

const STORE: Coordinate = Coordinate::new(51.5074, -0.1278);

#[derive(Resource, Default)]
struct Notifications(Vec<String>);

fn setup(authorization: AuthorizationStatus) -> App {
    let mut app = App::new();
    app.add_plugins((MinimalPlugins, GeofencePlugin))
        .init_resource::<Notifications>()
        .insert_resource(Geofence::new(InMemoryRegionMonitor::new(authorization)))
        .add_observer(|entered: On<RegionEntered>, mut log: ResMut<Notifications>| {
            log.0.push(format!("enter:{}", entered.region_id));
        })
        .add_observer(|exited: On<RegionExited>, mut log: ResMut<Notifications>| {
            log.0.push(format!("exit:{}", exited.region_id));
        });
    app
}

fn geofence(app: &mut App) -> Mut<'_, Geofence> { app.world_mut().resource_mut::<Geofence>() }

#[test]
fn region_transitions_become_events() {
    let mut app = setup(AuthorizationStatus::AuthorizedAlways);
    geofence(&mut app)
        .tracker_mut()
        .start_monitoring(STORE, 120.0, "store")
        .unwrap();

    geofence(&mut app)
        .tracker_mut()
        .handle_region_state("store", RegionState::Inside);
    geofence(&mut app).tracker_mut().handle_region_exited("store");
    app.update();

    assert_eq!(
        app.world().resource::<Notifications>().0,
        vec!["enter:store", "exit:store"]
    );
}

#[test]
fn unauthorized_start_registers_nothing() {
    let mut app = setup(AuthorizationStatus::Denied);

    let result = geofence(&mut app)
        .tracker_mut()
        .start_monitoring(STORE, 120.0, "store");

    assert_eq!(result, Err(GeofenceError::NotAuthorized));
    assert!(geofence(&mut app).tracker().monitored_regions().is_empty());
}

#[test]
fn stop_monitoring_empties_monitored_regions() {
    let mut app = setup(AuthorizationStatus::AuthorizedAlways);
    geofence(&mut app)
        .tracker_mut()
        .start_monitoring(STORE, 120.0, "store")
        .unwrap();
    app.update();

    geofence(&mut app).tracker_mut().stop_monitoring_regions();
    app.update();

    let fence = geofence(&mut app);
    assert!(fence.tracker().monitored_regions().is_empty());
    assert!(fence.tracker().tracked_region().is_none());
    assert!(app.world().resource::<Notifications>().0.is_empty());
}
