//! Rigid poses reported by the AR platform.

use nalgebra::{Isometry3, Matrix4, Point3, Translation3, UnitQuaternion, Vector3};

/// A rigid 3D pose (rotation + translation) in world space, meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose(pub Isometry3<f32>);

impl Pose {
    pub fn identity() -> Self {
        Self(Isometry3::identity())
    }

    /// Pose from a translation and a rotation quaternion `(x, y, z, w)`.
    pub fn from_parts(translation: [f32; 3], rotation_xyzw: [f32; 4]) -> Self {
        let [qx, qy, qz, qw] = rotation_xyzw;
        let rotation = UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(qw, qx, qy, qz));
        Self(Isometry3::from_parts(
            Translation3::new(translation[0], translation[1], translation[2]),
            rotation,
        ))
    }

    /// Pure translation.
    pub fn from_translation(x: f32, y: f32, z: f32) -> Self {
        Self(Isometry3::translation(x, y, z))
    }

    pub fn translation(&self) -> Vector3<f32> {
        self.0.translation.vector
    }

    /// Homogeneous 4x4 model matrix.
    pub fn to_matrix(&self) -> Matrix4<f32> {
        self.0.to_homogeneous()
    }

    /// Transform a point from pose-local to world space.
    pub fn transform_point(&self, point: &Point3<f32>) -> Point3<f32> {
        self.0.transform_point(point)
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}
