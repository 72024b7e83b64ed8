//! Visualization for resolved billboards
//!
//! Draws the resolved plane's outline, normal and hit corners with a dedicated gizmo
//! group, and gives rendered billboard quads a material.
//! Uses Bevy's GizmoConfigGroup pattern so the overlay can be toggled at runtime.

use bevy::prelude::*;

use crate::components::BillboardQuad;
use crate::components::BillboardView;

/// Gizmo config group for billboard visualization.
/// Toggle via `GizmoConfigStore::config_mut::<BillboardGizmo>().enabled`
#[derive(Default, Reflect, GizmoConfigGroup)]
pub struct BillboardGizmo {}

// Half length of the cross drawn at each hit corner
const CORNER_CROSS_HALF_SIZE: f32 = 0.02;

/// Configuration for billboard visualization colors and appearance
#[derive(Resource, Reflect, Debug, Clone)]
#[reflect(Resource)]
pub struct BillboardVisualizationConfig {
    pub outline_color: Color,
    pub corner_color:  Color,
    pub normal_color:  Color,
    pub quad_color:    Color,
    pub line_width:    f32,
    /// Length of the drawn normal as a fraction of the billboard's shorter edge
    pub normal_scale:  f32,
}

impl Default for BillboardVisualizationConfig {
    fn default() -> Self {
        Self {
            outline_color: Color::srgb(1.0, 1.0, 0.0),      // Yellow
            corner_color:  Color::srgb(1.0, 0.0, 0.0),      // Red
            normal_color:  Color::srgb(0.0, 0.6, 1.0),      // Blue
            quad_color:    Color::srgba(1.0, 1.0, 1.0, 0.85), // Translucent white
            line_width:    2.0,
            normal_scale:  0.5,
        }
    }
}

/// Plugin that adds billboard visualization functionality
pub struct BillboardVisualizationPlugin;

impl Plugin for BillboardVisualizationPlugin {
    fn build(&self, app: &mut App) {
        app.init_gizmo_group::<BillboardGizmo>()
            .init_resource::<BillboardVisualizationConfig>()
            .add_observer(apply_billboard_material)
            .add_systems(Startup, init_billboard_gizmo)
            .add_systems(Update, (sync_gizmo_line_width, draw_billboards).chain());
    }
}

/// Initialize the billboard gizmo config (disabled by default)
fn init_billboard_gizmo(
    mut config_store: ResMut<GizmoConfigStore>,
    viz_config: Res<BillboardVisualizationConfig>,
) {
    let (config, _) = config_store.config_mut::<BillboardGizmo>();
    config.enabled = false;
    config.line.width = viz_config.line_width;
    config.depth_bias = -1.0;
}

fn sync_gizmo_line_width(
    mut config_store: ResMut<GizmoConfigStore>,
    viz_config: Res<BillboardVisualizationConfig>,
) {
    if !viz_config.is_changed() {
        return;
    }
    let (config, _) = config_store.config_mut::<BillboardGizmo>();
    config.line.width = viz_config.line_width;
}

/// Draws each view's billboard outline, hit corners and normal
fn draw_billboards(
    mut gizmos: Gizmos<BillboardGizmo>,
    viz_config: Res<BillboardVisualizationConfig>,
    view_query: Query<&BillboardView>,
) {
    for view in &view_query {
        let Some(billboard) = view.billboard() else {
            continue;
        };
        let plane = &billboard.plane;
        let corners = plane.corner_positions();

        for (index, corner) in corners.iter().enumerate() {
            let next = corners[(index + 1) % corners.len()];
            gizmos.line(*corner, next, viz_config.outline_color);

            for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
                let offset = plane.center.rotation * axis * CORNER_CROSS_HALF_SIZE;
                gizmos.line(*corner - offset, *corner + offset, viz_config.corner_color);
            }
        }

        let center = plane.center.translation;
        let normal_length = plane.width.min(plane.height) * viz_config.normal_scale;
        gizmos.line(
            center,
            center + plane.normal() * normal_length,
            viz_config.normal_color,
        );
    }
}

/// Observer that gives a newly rendered billboard quad its material
fn apply_billboard_material(
    add: On<Add, BillboardQuad>,
    mut commands: Commands,
    viz_config: Res<BillboardVisualizationConfig>,
    materials: Option<ResMut<Assets<StandardMaterial>>>,
) {
    let Some(mut materials) = materials else {
        return;
    };

    let material = materials.add(StandardMaterial {
        base_color: viz_config.quad_color,
        alpha_mode: AlphaMode::Blend,
        unlit: true,
        ..default()
    });
    commands.entity(add.entity).insert(MeshMaterial3d(material));
}
