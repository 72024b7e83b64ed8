//! Convenient re-exports for common types and traits

pub use crate::BillboardPlugin;
pub use crate::components::BillboardPhase;
pub use crate::components::BillboardView;
pub use crate::events::BillboardPlaced;
pub use crate::events::BillboardRemoved;
pub use crate::events::BillboardRendered;
pub use crate::events::CameraFrameUpdated;
pub use crate::events::DetectBillboard;
pub use crate::events::DetectionFailed;
pub use crate::events::SessionInterrupted;
pub use crate::geofence::Geofence;
pub use crate::geofence::GeofencePlugin;
pub use crate::geofence::RegionEntered;
pub use crate::geofence::RegionExited;
pub use crate::pipeline::BillboardConfig;
pub use crate::pipeline::RectangleDetectorHandle;
pub use crate::projection::CameraFrame;
pub use crate::projection::RectangleDetector;
pub use crate::projection::RectangleObservation;
