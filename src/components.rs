//! Components used by the billboard pipeline.

use std::sync::Arc;

use bevy::prelude::*;

use crate::plane::Corner;
use crate::plane::RectangularPlane;
use crate::projection::CameraFrame;

/// Lifecycle phase of a view's billboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum BillboardPhase {
    Empty,
    /// Anchor registered, waiting for its geometry
    Pending,
    /// Anchor registered and its quad node attached
    Rendered,
}

/// The single billboard owned by a view: a resolved plane, its anchor entity and,
/// once rendered, the quad node parented to that anchor.
#[derive(Debug, Clone)]
pub struct BillboardContainer {
    pub plane:  RectangularPlane,
    pub anchor: Entity,
    pub node:   Option<Entity>,
}

impl BillboardContainer {
    pub const fn new(plane: RectangularPlane, anchor: Entity) -> Self {
        Self {
            plane,
            anchor,
            node: None,
        }
    }

    pub const fn phase(&self) -> BillboardPhase {
        if self.node.is_some() {
            BillboardPhase::Rendered
        } else {
            BillboardPhase::Pending
        }
    }

    /// Geometry to render for `anchor`, or `None` when `anchor` is not this
    /// container's pending anchor.
    pub fn geometry_for(&self, anchor: Entity) -> Option<BillboardQuad> {
        (self.anchor == anchor && self.node.is_none()).then(|| BillboardQuad {
            width:  self.plane.width,
            height: self.plane.height,
        })
    }
}

/// AR view controller state. Add this to the entity that receives camera frames and
/// touch events; the pipeline keeps at most one billboard per view.
#[derive(Component, Default)]
pub struct BillboardView {
    pub(crate) current_frame:      Option<Arc<dyn CameraFrame>>,
    pub(crate) billboard:          Option<BillboardContainer>,
    pub(crate) last_session_error: Option<String>,
}

impl BillboardView {
    pub const fn billboard(&self) -> Option<&BillboardContainer> { self.billboard.as_ref() }

    pub fn phase(&self) -> BillboardPhase {
        self.billboard
            .as_ref()
            .map_or(BillboardPhase::Empty, BillboardContainer::phase)
    }

    pub const fn has_frame(&self) -> bool { self.current_frame.is_some() }

    pub fn last_session_error(&self) -> Option<&str> { self.last_session_error.as_deref() }
}

/// Marks an anchor registered in the tracking session for a view's billboard.
#[derive(Component, Reflect, Debug)]
#[reflect(Component)]
pub struct BillboardAnchor {
    pub view: Entity,
}

/// The rendered billboard quad, sized to the resolved plane.
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq)]
#[reflect(Component)]
pub struct BillboardQuad {
    pub width:  f32,
    pub height: f32,
}

/// Marks a debug marker placed at one hit-test corner of the billboard.
#[derive(Component, Reflect, Debug)]
#[reflect(Component)]
pub struct CornerMarker {
    pub corner: Corner,
}
