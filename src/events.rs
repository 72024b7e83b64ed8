//! Session signals consumed by the billboard pipeline and the lifecycle events it emits.

use std::sync::Arc;

use bevy::prelude::*;

use crate::projection::CameraFrame;
use crate::projection::DetectionError;

// ============================================================================
// Session signals (consumed)
// ============================================================================

/// A new camera frame is available for `entity`'s view.
#[derive(EntityEvent, Clone)]
pub struct CameraFrameUpdated {
    pub entity: Entity,
    pub frame:  Arc<dyn CameraFrame>,
}

impl CameraFrameUpdated {
    pub fn new(entity: Entity, frame: impl CameraFrame + 'static) -> Self {
        Self {
            entity,
            frame: Arc::new(frame),
        }
    }
}

/// Touch or trigger: detect a rectangle in the current frame and place a billboard.
#[derive(EntityEvent, Reflect)]
#[reflect(Event, FromReflect)]
pub struct DetectBillboard {
    pub entity: Entity,
}

/// The tracking session was interrupted. Tears the billboard down.
#[derive(EntityEvent, Reflect)]
#[reflect(Event, FromReflect)]
pub struct SessionInterrupted {
    pub entity: Entity,
}

/// The tracking session resumed. The billboard is not rebuilt; detect again.
#[derive(EntityEvent, Reflect)]
#[reflect(Event, FromReflect)]
pub struct SessionInterruptionEnded {
    pub entity: Entity,
}

/// The tracking session failed.
#[derive(EntityEvent, Reflect)]
#[reflect(Event, FromReflect)]
pub struct SessionFailed {
    pub entity:  Entity,
    pub message: String,
}

// ============================================================================
// Billboard lifecycle (emitted)
// ============================================================================

/// Why a billboard was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum RemovalReason {
    /// A newer detection replaced it
    Superseded,
    /// The tracking session was interrupted
    Interrupted,
}

/// Fired when a billboard anchor is registered for a view.
#[derive(EntityEvent, Reflect)]
#[reflect(Event, FromReflect)]
pub struct BillboardPlaced {
    #[event_target]
    pub view_entity: Entity,
    pub anchor:      Entity,
    pub width:       f32,
    pub height:      f32,
}

/// Fired when the billboard quad node is attached to its anchor.
#[derive(EntityEvent, Reflect)]
#[reflect(Event, FromReflect)]
pub struct BillboardRendered {
    #[event_target]
    pub view_entity: Entity,
    pub anchor:      Entity,
    pub node:        Entity,
}

/// Fired when a billboard's anchor (and node, if any) is removed.
#[derive(EntityEvent, Reflect)]
#[reflect(Event, FromReflect)]
pub struct BillboardRemoved {
    #[event_target]
    pub view_entity: Entity,
    pub anchor:      Entity,
    pub reason:      RemovalReason,
}

/// Fired when a detection attempt ends without a billboard.
/// Only emitted while `BillboardConfig::report_failures` is set.
#[derive(EntityEvent, Debug, Clone)]
pub struct DetectionFailed {
    #[event_target]
    pub view_entity: Entity,
    pub reason:      DetectionError,
}

/// Fired when the tracking session reports an error.
#[derive(EntityEvent, Reflect)]
#[reflect(Event, FromReflect)]
pub struct SessionError {
    #[event_target]
    pub view_entity: Entity,
    pub message:     String,
}
