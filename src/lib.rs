// bevy_ar_billboard
// AR billboard placement for Bevy providing:
// - Rectangle-to-3D projection via feature-point hit-testing
// - Rectangular plane derivation and a single anchored billboard per view
// - Geofence tracking over a platform region-monitoring service

use bevy::prelude::*;

mod components;
mod events;
pub mod geofence;
mod observers;
mod pipeline;
pub mod plane;
pub mod prelude;
pub mod projection;
#[cfg(feature = "visualization")]
mod visualization;

// Public API - Session signals
pub use events::CameraFrameUpdated;
pub use events::DetectBillboard;
pub use events::SessionFailed;
pub use events::SessionInterrupted;
pub use events::SessionInterruptionEnded;

// Public API - Lifecycle events
pub use events::BillboardPlaced;
pub use events::BillboardRemoved;
pub use events::BillboardRendered;
pub use events::DetectionFailed;
pub use events::RemovalReason;
pub use events::SessionError;

// Public API - Components (for querying)
pub use components::BillboardAnchor;
pub use components::BillboardContainer;
pub use components::BillboardPhase;
pub use components::BillboardQuad;
pub use components::BillboardView;
pub use components::CornerMarker;

// Public API - Geometry
pub use plane::Corner;
pub use plane::PlaneError;
pub use plane::RectCorners;
pub use plane::RectangularPlane;
pub use projection::CameraFrame;
pub use projection::DetectionError;
pub use projection::FeaturePointFrame;
pub use projection::FixedRectangleDetector;
pub use projection::RectangleDetector;
pub use projection::RectangleObservation;

// Public API - Configuration resources
pub use pipeline::BillboardConfig;
pub use pipeline::RectangleDetectorHandle;

// Public API - In-flight detections (for querying)
pub use pipeline::DetectionTask;

// Public API - Geofence
pub use geofence::Geofence;
pub use geofence::GeofencePlugin;
pub use geofence::RegionEntered;
pub use geofence::RegionExited;

// Public API - Visualization
#[cfg(feature = "visualization")]
pub use visualization::BillboardGizmo;
#[cfg(feature = "visualization")]
pub use visualization::BillboardVisualizationConfig;
#[cfg(feature = "visualization")]
pub use visualization::BillboardVisualizationPlugin;

// Internal - used by plugin, not for external use
use observers::on_billboard_anchor_added;
use observers::on_billboard_view_removed;
use observers::on_camera_frame_updated;
use observers::on_detect_billboard;
use observers::on_session_failed;
use observers::on_session_interrupted;
use observers::on_session_interruption_ended;
use pipeline::poll_detection_tasks;

/// Plugin that adds billboard detection and placement
pub struct BillboardPlugin;

impl Plugin for BillboardPlugin {
    fn build(&self, app: &mut App) {
        app
            // Register observers for session signals
            .add_observer(on_camera_frame_updated)
            .add_observer(on_detect_billboard)
            .add_observer(on_session_interrupted)
            .add_observer(on_session_interruption_ended)
            .add_observer(on_session_failed)
            // Register observers for component lifecycle events
            .add_observer(on_billboard_anchor_added)
            .add_observer(on_billboard_view_removed)
            // Add systems
            .add_systems(Update, poll_detection_tasks)
            // Initialize resources
            .init_resource::<BillboardConfig>();
    }
}
