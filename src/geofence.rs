//! Geofence tracking over a platform region-monitoring service.
//!
//! `GeofenceTracker` owns the single tracked region and forwards enter/exit
//! notifications to an injected `GeofenceListener`. The platform is reached through
//! `RegionMonitor`; `InMemoryRegionMonitor` stands in for it in tests and demos.
//! `GeofencePlugin` drives a tracker stored in the `Geofence` resource and turns its
//! notifications into `RegionEntered` and `RegionExited` events.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use bevy::prelude::*;
use thiserror::Error;

/// Delay before asking the platform for a freshly registered region's state.
/// Some platforms drop the initial state if it is requested immediately.
pub const STATE_REQUEST_DELAY: Duration = Duration::from_secs(1);

/// Mean Earth radius in metres.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeofenceError {
    #[error("region monitoring is not supported on this device")]
    NotSupported,
    #[error("region monitoring requires \"always\" location authorization")]
    NotAuthorized,
}

/// Location authorization granted to the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum AuthorizationStatus {
    #[default]
    NotDetermined,
    Restricted,
    Denied,
    AuthorizedWhenInUse,
    AuthorizedAlways,
}

/// Whether the device is inside a monitored region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum RegionState {
    Unknown,
    Inside,
    Outside,
}

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub struct Coordinate {
    pub latitude:  f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in metres (haversine).
    pub fn distance_to(&self, other: &Self) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat * 0.5).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon * 0.5).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }
}

/// A circular region monitored for entry and exit.
#[derive(Debug, Clone, PartialEq, Reflect)]
pub struct GeofenceRegion {
    pub center:     Coordinate,
    /// Radius in metres
    pub radius:     f64,
    pub identifier: String,
}

impl GeofenceRegion {
    pub fn contains(&self, location: &Coordinate) -> bool {
        self.center.distance_to(location) <= self.radius
    }
}

/// A ranged beacon.
#[derive(Debug, Clone, PartialEq, Reflect)]
pub struct Beacon {
    pub uuid:     String,
    pub major:    u16,
    pub minor:    u16,
    /// Estimated distance in metres
    pub accuracy: f64,
}

// ============================================================================
// Platform and listener seams
// ============================================================================

/// Platform region-monitoring service.
pub trait RegionMonitor: Send + Sync {
    fn is_monitoring_available(&self) -> bool;
    fn authorization_status(&self) -> AuthorizationStatus;
    fn request_always_authorization(&mut self);
    fn start_updating_location(&mut self);
    fn start_monitoring(&mut self, region: &GeofenceRegion);
    fn stop_monitoring(&mut self, identifier: &str);
    fn monitored_regions(&self) -> Vec<GeofenceRegion>;
    fn request_state(&mut self, identifier: &str);
}

impl<M: RegionMonitor + ?Sized> RegionMonitor for Box<M> {
    fn is_monitoring_available(&self) -> bool { (**self).is_monitoring_available() }

    fn authorization_status(&self) -> AuthorizationStatus { (**self).authorization_status() }

    fn request_always_authorization(&mut self) { (**self).request_always_authorization() }

    fn start_updating_location(&mut self) { (**self).start_updating_location() }

    fn start_monitoring(&mut self, region: &GeofenceRegion) { (**self).start_monitoring(region) }

    fn stop_monitoring(&mut self, identifier: &str) { (**self).stop_monitoring(identifier) }

    fn monitored_regions(&self) -> Vec<GeofenceRegion> { (**self).monitored_regions() }

    fn request_state(&mut self, identifier: &str) { (**self).request_state(identifier) }
}

/// Receives geofence notifications from a `GeofenceTracker`.
pub trait GeofenceListener: Send + Sync {
    fn on_region_enter(&mut self, region_id: &str);

    fn on_region_exit(&mut self, region_id: &str);

    /// Declared for beacon ranging, which the tracker does not implement; never called.
    fn on_beacon_ranged(&mut self, _beacon: &Beacon) {}

    /// Declared for beacon ranging, which the tracker does not implement; never called.
    fn on_beacon_lost(&mut self, _beacon: &Beacon) {}
}

// ============================================================================
// Tracker
// ============================================================================

struct PendingStateRequest {
    region_id: String,
    timer:     Timer,
}

/// Tracks at most one circular region.
pub struct GeofenceTracker<M> {
    monitor:             M,
    listener:            Option<Box<dyn GeofenceListener>>,
    tracked:             Option<GeofenceRegion>,
    state_request:       Option<PendingStateRequest>,
    state_request_delay: Duration,
}

impl<M: RegionMonitor> GeofenceTracker<M> {
    pub fn new(monitor: M) -> Self {
        Self {
            monitor,
            listener: None,
            tracked: None,
            state_request: None,
            state_request_delay: STATE_REQUEST_DELAY,
        }
    }

    pub fn with_listener(mut self, listener: impl GeofenceListener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn with_state_request_delay(mut self, delay: Duration) -> Self {
        self.state_request_delay = delay;
        self
    }

    pub fn set_listener(&mut self, listener: Option<Box<dyn GeofenceListener>>) {
        self.listener = listener;
    }

    pub const fn monitor(&self) -> &M { &self.monitor }

    pub const fn monitor_mut(&mut self) -> &mut M { &mut self.monitor }

    pub const fn tracked_region(&self) -> Option<&GeofenceRegion> { self.tracked.as_ref() }

    pub fn monitored_regions(&self) -> Vec<GeofenceRegion> { self.monitor.monitored_regions() }

    /// True while a delayed state request is scheduled.
    pub const fn has_pending_state_request(&self) -> bool { self.state_request.is_some() }

    /// Asks for "always" authorization (required for region monitoring) and starts
    /// location updates.
    pub fn initialize(&mut self) {
        self.monitor.request_always_authorization();
        self.monitor.start_updating_location();
    }

    /// Starts monitoring a circular region, replacing the tracked one.
    ///
    /// The region's current state is requested after the state-request delay so an
    /// app launched inside the region still receives an enter notification.
    pub fn start_monitoring(
        &mut self,
        center: Coordinate,
        radius: f64,
        identifier: impl Into<String>,
    ) -> Result<(), GeofenceError> {
        if !self.monitor.is_monitoring_available() {
            return Err(GeofenceError::NotSupported);
        }
        if self.monitor.authorization_status() != AuthorizationStatus::AuthorizedAlways {
            return Err(GeofenceError::NotAuthorized);
        }

        if let Some(previous) = self.tracked.take() {
            debug!("Replacing tracked region {}", previous.identifier);
            self.monitor.stop_monitoring(&previous.identifier);
        }

        let region = GeofenceRegion {
            center,
            radius,
            identifier: identifier.into(),
        };
        self.monitor.start_monitoring(&region);
        info!(
            "Monitoring region {} ({:.0} m around {:.5}, {:.5})",
            region.identifier, region.radius, center.latitude, center.longitude
        );

        self.state_request = Some(PendingStateRequest {
            region_id: region.identifier.clone(),
            timer:     Timer::new(self.state_request_delay, TimerMode::Once),
        });
        self.tracked = Some(region);
        Ok(())
    }

    /// Stops tracking and unregisters every monitored region.
    pub fn stop_monitoring_regions(&mut self) {
        self.tracked = None;
        self.state_request = None;
        for region in self.monitor.monitored_regions() {
            self.monitor.stop_monitoring(&region.identifier);
        }
    }

    /// Advances the delayed state request.
    pub fn tick(&mut self, delta: Duration) {
        let Some(pending) = self.state_request.as_mut() else {
            return;
        };
        pending.timer.tick(delta);
        if !pending.timer.just_finished() {
            return;
        }

        if let Some(pending) = self.state_request.take() {
            debug!("Requesting state for region {}", pending.region_id);
            self.monitor.request_state(&pending.region_id);
        }
    }

    /// Handles a batch of location updates. Returns the distance in metres from the
    /// latest location to the tracked region's center.
    pub fn handle_location_update(&mut self, locations: &[Coordinate]) -> Option<f64> {
        let current = locations.last()?;
        let tracked = self.tracked.as_ref()?;
        let distance = current.distance_to(&tracked.center);
        debug!("Distance to {}: {distance:.1} m", tracked.identifier);
        Some(distance)
    }

    /// Handles the platform's answer to a state request.
    pub fn handle_region_state(&mut self, region_id: &str, state: RegionState) {
        match state {
            RegionState::Inside => self.handle_region_entered(region_id),
            RegionState::Outside | RegionState::Unknown => {},
        }
    }

    pub fn handle_region_entered(&mut self, region_id: &str) {
        info!("Entered region {region_id}");
        if let Some(listener) = self.listener.as_mut() {
            listener.on_region_enter(region_id);
        }
    }

    pub fn handle_region_exited(&mut self, region_id: &str) {
        info!("Left region {region_id}");
        if let Some(listener) = self.listener.as_mut() {
            listener.on_region_exit(region_id);
        }
    }

    pub fn handle_authorization_changed(&mut self, status: AuthorizationStatus) {
        info!("Location authorization changed to {status:?}");
    }

    pub fn handle_monitoring_failed(&mut self, region_id: Option<&str>, message: &str) {
        warn!("Geofence monitoring failed for region {region_id:?}: {message}");
    }

    pub fn handle_location_failed(&mut self, message: &str) {
        warn!("Location updates failed: {message}");
    }
}

// ============================================================================
// In-memory platform
// ============================================================================

/// Region monitor that keeps its state in memory.
#[derive(Debug, Clone)]
pub struct InMemoryRegionMonitor {
    pub available:         bool,
    pub authorization:     AuthorizationStatus,
    pub updating_location: bool,
    pub regions:           Vec<GeofenceRegion>,
    /// Identifiers passed to `request_state`, oldest first
    pub state_requests:    Vec<String>,
}

impl InMemoryRegionMonitor {
    /// An available monitor with the given authorization.
    pub const fn new(authorization: AuthorizationStatus) -> Self {
        Self {
            available: true,
            authorization,
            updating_location: false,
            regions: Vec::new(),
            state_requests: Vec::new(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(AuthorizationStatus::AuthorizedAlways)
        }
    }
}

impl RegionMonitor for InMemoryRegionMonitor {
    fn is_monitoring_available(&self) -> bool { self.available }

    fn authorization_status(&self) -> AuthorizationStatus { self.authorization }

    fn request_always_authorization(&mut self) {
        if self.authorization == AuthorizationStatus::NotDetermined {
            self.authorization = AuthorizationStatus::AuthorizedAlways;
        }
    }

    fn start_updating_location(&mut self) { self.updating_location = true; }

    fn start_monitoring(&mut self, region: &GeofenceRegion) {
        self.regions.retain(|r| r.identifier != region.identifier);
        self.regions.push(region.clone());
    }

    fn stop_monitoring(&mut self, identifier: &str) {
        self.regions.retain(|r| r.identifier != identifier);
    }

    fn monitored_regions(&self) -> Vec<GeofenceRegion> { self.regions.clone() }

    fn request_state(&mut self, identifier: &str) {
        self.state_requests.push(identifier.to_owned());
    }
}

// ============================================================================
// Bevy integration
// ============================================================================

/// Fired when the device enters a monitored region.
#[derive(Event, Reflect, Debug, Clone)]
#[reflect(Event, FromReflect)]
pub struct RegionEntered {
    pub region_id: String,
}

/// Fired when the device leaves a monitored region.
#[derive(Event, Reflect, Debug, Clone)]
#[reflect(Event, FromReflect)]
pub struct RegionExited {
    pub region_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GeofenceNotification {
    Entered(String),
    Exited(String),
}

/// Listener that queues notifications for `GeofencePlugin` to turn into events.
#[derive(Clone, Default)]
struct NotificationQueue(Arc<Mutex<VecDeque<GeofenceNotification>>>);

impl NotificationQueue {
    fn lock(&self) -> MutexGuard<'_, VecDeque<GeofenceNotification>> {
        self.0.lock().unwrap_or_else(|poisoned| {
            warn!("Geofence notification queue was poisoned; recovering");
            poisoned.into_inner()
        })
    }

    fn push(&self, notification: GeofenceNotification) { self.lock().push_back(notification); }

    fn drain(&self) -> Vec<GeofenceNotification> { self.lock().drain(..).collect() }
}

impl GeofenceListener for NotificationQueue {
    fn on_region_enter(&mut self, region_id: &str) {
        self.push(GeofenceNotification::Entered(region_id.to_owned()));
    }

    fn on_region_exit(&mut self, region_id: &str) {
        self.push(GeofenceNotification::Exited(region_id.to_owned()));
    }
}

/// Resource holding the app's geofence tracker.
#[derive(Resource)]
pub struct Geofence {
    tracker:       GeofenceTracker<Box<dyn RegionMonitor>>,
    notifications: NotificationQueue,
}

impl Geofence {
    pub fn new(monitor: impl RegionMonitor + 'static) -> Self {
        let notifications = NotificationQueue::default();
        let tracker = GeofenceTracker::new(Box::new(monitor) as Box<dyn RegionMonitor>)
            .with_listener(notifications.clone());
        Self {
            tracker,
            notifications,
        }
    }

    pub const fn tracker(&self) -> &GeofenceTracker<Box<dyn RegionMonitor>> { &self.tracker }

    pub const fn tracker_mut(&mut self) -> &mut GeofenceTracker<Box<dyn RegionMonitor>> {
        &mut self.tracker
    }
}

/// Plugin that drives the `Geofence` resource, when one is inserted.
pub struct GeofencePlugin;

impl Plugin for GeofencePlugin {
    fn build(&self, app: &mut App) { app.add_systems(Update, drive_geofence); }
}

/// System that ticks the tracker and forwards its notifications as events
fn drive_geofence(time: Res<Time>, geofence: Option<ResMut<Geofence>>, mut commands: Commands) {
    let Some(mut geofence) = geofence else {
        return;
    };

    geofence.tracker.tick(time.delta());

    for notification in geofence.notifications.drain() {
        match notification {
            GeofenceNotification::Entered(region_id) => {
                commands.trigger(RegionEntered { region_id });
            },
            GeofenceNotification::Exited(region_id) => {
                commands.trigger(RegionExited { region_id });
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SF: Coordinate = Coordinate::new(37.7749, -122.4194);

    #[derive(Clone, Default)]
    struct RecordingListener(Arc<Mutex<Vec<String>>>);

    impl RecordingListener {
        fn events(&self) -> Vec<String> { self.0.lock().unwrap().clone() }
    }

    impl GeofenceListener for RecordingListener {
        fn on_region_enter(&mut self, region_id: &str) {
            self.0.lock().unwrap().push(format!("enter:{region_id}"));
        }

        fn on_region_exit(&mut self, region_id: &str) {
            self.0.lock().unwrap().push(format!("exit:{region_id}"));
        }
    }

    fn authorized_tracker() -> GeofenceTracker<InMemoryRegionMonitor> {
        GeofenceTracker::new(InMemoryRegionMonitor::new(
            AuthorizationStatus::AuthorizedAlways,
        ))
    }

    #[test]
    fn start_monitoring_registers_region() {
        let mut tracker = authorized_tracker();

        tracker.start_monitoring(SF, 100.0, "store").unwrap();

        assert_eq!(tracker.tracked_region().unwrap().identifier, "store");
        assert_eq!(tracker.monitored_regions().len(), 1);
    }

    #[test]
    fn unavailable_monitoring_is_not_supported() {
        let mut tracker = GeofenceTracker::new(InMemoryRegionMonitor::unavailable());

        assert_eq!(
            tracker.start_monitoring(SF, 100.0, "store"),
            Err(GeofenceError::NotSupported)
        );
        assert!(tracker.monitored_regions().is_empty());
    }

    #[test]
    fn when_in_use_authorization_is_rejected() {
        let mut tracker = GeofenceTracker::new(InMemoryRegionMonitor::new(
            AuthorizationStatus::AuthorizedWhenInUse,
        ));

        assert_eq!(
            tracker.start_monitoring(SF, 100.0, "store"),
            Err(GeofenceError::NotAuthorized)
        );
        assert!(tracker.monitored_regions().is_empty());
        assert!(tracker.tracked_region().is_none());
    }

    #[test]
    fn initialize_requests_authorization_and_location() {
        let mut tracker =
            GeofenceTracker::new(InMemoryRegionMonitor::new(AuthorizationStatus::NotDetermined));

        tracker.initialize();

        assert!(tracker.monitor().updating_location);
        assert!(tracker.start_monitoring(SF, 50.0, "store").is_ok());
    }

    #[test]
    fn replacing_region_unregisters_previous() {
        let mut tracker = authorized_tracker();

        tracker.start_monitoring(SF, 100.0, "first").unwrap();
        tracker.start_monitoring(SF, 200.0, "second").unwrap();

        let regions = tracker.monitored_regions();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].identifier, "second");
    }

    #[test]
    fn stop_monitoring_clears_everything() {
        let mut tracker = authorized_tracker();
        tracker.start_monitoring(SF, 100.0, "store").unwrap();

        tracker.stop_monitoring_regions();

        assert!(tracker.monitored_regions().is_empty());
        assert!(tracker.tracked_region().is_none());
        assert!(!tracker.has_pending_state_request());
    }

    #[test]
    fn state_request_fires_once_after_delay() {
        let mut tracker = authorized_tracker();
        tracker.start_monitoring(SF, 100.0, "store").unwrap();

        tracker.tick(Duration::from_millis(600));
        assert!(tracker.monitor().state_requests.is_empty());

        tracker.tick(Duration::from_millis(600));
        tracker.tick(Duration::from_millis(600));
        assert_eq!(tracker.monitor().state_requests, vec!["store".to_owned()]);
    }

    #[test]
    fn stopping_cancels_state_request() {
        let mut tracker = authorized_tracker();
        tracker.start_monitoring(SF, 100.0, "store").unwrap();

        tracker.stop_monitoring_regions();
        tracker.tick(Duration::from_secs(2));

        assert!(tracker.monitor().state_requests.is_empty());
    }

    #[test]
    fn inside_state_forwards_enter() {
        let listener = RecordingListener::default();
        let mut tracker = authorized_tracker().with_listener(listener.clone());

        tracker.handle_region_state("store", RegionState::Inside);
        tracker.handle_region_state("store", RegionState::Outside);
        tracker.handle_region_exited("store");

        assert_eq!(listener.events(), vec!["enter:store", "exit:store"]);
    }

    #[test]
    fn distance_is_measured_from_latest_location() {
        let mut tracker = authorized_tracker();
        assert!(tracker.handle_location_update(&[SF]).is_none());

        tracker.start_monitoring(SF, 100.0, "store").unwrap();
        // 0.01 degrees of latitude is about 1.11 km
        let north = Coordinate::new(SF.latitude + 0.01, SF.longitude);
        let distance = tracker.handle_location_update(&[SF, north]).unwrap();

        assert!((distance - 1_111.95).abs() < 1.0);
    }

    #[test]
    fn region_contains_nearby_points() {
        let region = GeofenceRegion {
            center:     SF,
            radius:     150.0,
            identifier: "store".into(),
        };

        assert!(region.contains(&Coordinate::new(SF.latitude + 0.001, SF.longitude)));
        assert!(!region.contains(&Coordinate::new(SF.latitude + 0.01, SF.longitude)));
    }

    #[test]
    fn poisoned_queue_keeps_notifications() {
        let queue = NotificationQueue::default();
        let holder = queue.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.0.lock().unwrap();
            panic!("listener panicked while holding the queue");
        })
        .join();
        assert!(queue.0.is_poisoned());

        let mut listener = queue.clone();
        listener.on_region_enter("store");
        listener.on_region_exit("store");

        assert_eq!(
            queue.drain(),
            vec![
                GeofenceNotification::Entered("store".into()),
                GeofenceNotification::Exited("store".into()),
            ]
        );
    }
}
