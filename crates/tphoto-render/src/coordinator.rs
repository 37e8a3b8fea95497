//! Per-frame projection of the poster anchor to screen space.

use nalgebra::{Isometry3, Matrix4, Perspective3, Point2, Vector3, Vector4};

use tphoto_models::Pose;

/// Camera matrices for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// World to camera
    pub view: Matrix4<f32>,
    /// Camera to clip space (OpenGL conventions)
    pub projection: Matrix4<f32>,
}

impl CameraPose {
    pub fn new(view: Matrix4<f32>, projection: Matrix4<f32>) -> Self {
        Self { view, projection }
    }

    /// Build from the camera's world pose and a perspective projection.
    pub fn from_world_pose(camera: &Pose, aspect: f32, fovy: f32, znear: f32, zfar: f32) -> Self {
        let view: Isometry3<f32> = camera.0.inverse();
        Self {
            view: view.to_homogeneous(),
            projection: Perspective3::new(aspect, fovy, znear, zfar).to_homogeneous(),
        }
    }
}

/// Output size in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Screen placement of the poster for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTransform {
    /// Model-view-projection matrix
    pub matrix: Matrix4<f32>,
    /// Anchor position in pixels, origin top-left
    pub screen_position: Point2<f32>,
    pub is_visible: bool,
}

impl RenderTransform {
    fn hidden(matrix: Matrix4<f32>) -> Self {
        Self {
            matrix,
            screen_position: Point2::origin(),
            is_visible: false,
        }
    }
}

/// Projects the tracked anchor through the camera each frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderCoordinator {
    /// Physical poster size (x, z) in meters; scales the unit quad.
    extents: Option<(f32, f32)>,
}

impl RenderCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extents(extent_x: f32, extent_z: f32) -> Self {
        let mut coordinator = Self::new();
        coordinator.set_extents(extent_x, extent_z);
        coordinator
    }

    /// Ignored unless both extents are positive and finite.
    pub fn set_extents(&mut self, extent_x: f32, extent_z: f32) {
        let valid = |v: f32| v.is_finite() && v > 0.0;
        self.extents = (valid(extent_x) && valid(extent_z)).then_some((extent_x, extent_z));
    }

    pub fn extents(&self) -> Option<(f32, f32)> {
        self.extents
    }

    pub fn calculate_transform(
        &self,
        anchor: &Pose,
        camera: &CameraPose,
        viewport: Viewport,
    ) -> RenderTransform {
        let mut model = anchor.to_matrix();
        if let Some((x, z)) = self.extents {
            model *= Matrix4::new_nonuniform_scaling(&Vector3::new(x, 1.0, z));
        }
        let matrix = camera.projection * camera.view * model;

        if viewport.is_empty() {
            return RenderTransform::hidden(matrix);
        }

        let clip: Vector4<f32> = matrix * Vector4::new(0.0, 0.0, 0.0, 1.0);
        if clip.w <= f32::EPSILON {
            return RenderTransform::hidden(matrix);
        }

        let ndc = clip.xyz() / clip.w;
        let inside = |v: f32| (-1.0..=1.0).contains(&v);
        if !(inside(ndc.x) && inside(ndc.y) && inside(ndc.z)) {
            return RenderTransform::hidden(matrix);
        }

        let screen_x = (ndc.x + 1.0) * 0.5 * viewport.width;
        let screen_y = (1.0 - ndc.y) * 0.5 * viewport.height;

        RenderTransform {
            matrix,
            screen_position: Point2::new(
                screen_x.clamp(0.0, viewport.width),
                screen_y.clamp(0.0, viewport.height),
            ),
            is_visible: true,
        }
    }
}
