use std::cell::Cell;

use glam::{EulerRot, Mat4, Quat, Vec3};

/// Position, Euler rotation (radians, XYZ order) and per-axis scale, with
/// the model matrix rebuilt only after a change.
#[derive(Debug, Clone)]
pub struct Transform {
    position: Vec3,
    rotation: Vec3,
    scale: Vec3,

    local_matrix: Cell<Mat4>,
    local_dirty: Cell<bool>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            local_matrix: Cell::new(Mat4::IDENTITY),
            local_dirty: Cell::new(true),
        }
    }
}

impl Transform {
    pub fn local_matrix(&self) -> Mat4 {
        if self.local_dirty.get() {
            let rotation = Quat::from_euler(
                EulerRot::XYZ,
                self.rotation.x,
                self.rotation.y,
                self.rotation.z,
            );
            self.local_matrix.set(Mat4::from_scale_rotation_translation(
                self.scale,
                rotation,
                self.position,
            ));
            self.local_dirty.set(false);
        }

        self.local_matrix.get()
    }

    fn invalidate(&self) {
        self.local_dirty.set(true);
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.invalidate();
    }

    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.rotation = rotation;
        self.invalidate();
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.invalidate();
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_follows_setters() {
        let mut transform = Transform::default();
        assert_eq!(transform.local_matrix(), Mat4::IDENTITY);

        transform.set_position(Vec3::new(1.0, 2.0, 3.0));
        transform.set_scale(Vec3::new(2.0, 2.0, 2.0));
        let matrix = transform.local_matrix();
        assert_eq!(matrix.transform_point3(Vec3::ZERO), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(
            matrix.transform_point3(Vec3::X),
            Vec3::new(3.0, 2.0, 3.0)
        );

        transform.set_position(Vec3::new(2.0, 2.0, 3.0));
        assert_eq!(
            transform.local_matrix().transform_point3(Vec3::ZERO),
            Vec3::new(2.0, 2.0, 3.0)
        );
    }

    #[test]
    fn rotation_is_in_radians() {
        let mut transform = Transform::default();
        transform.set_rotation(Vec3::new(0.0, 0.0, std::f32::consts::FRAC_PI_2));
        let rotated = transform.local_matrix().transform_vector3(Vec3::X);
        assert!(rotated.abs_diff_eq(Vec3::Y, 1e-6));
    }
}
