use std::{cell::Cell, path::Path};

use glam::{Mat4, Vec3, Vec4};

use crate::scripting::{
    env::ScriptEnv,
    host::{ScriptHost, ScriptTarget},
};

#[derive(Debug, Clone, Copy)]
struct CameraMatrices {
    view: Mat4,
    projection: Mat4,
    view_projection: Mat4,
}

pub struct Camera {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    // Vertical, in degrees.
    fov: f32,
    aspect_ratio: f32,
    near: f32,
    far: f32,

    matrices: Cell<Option<CameraMatrices>>,
    script: Option<ScriptHost>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: 45.0,
            aspect_ratio: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
            matrices: Cell::new(None),
            script: None,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    fn invalidate(&mut self) {
        self.matrices.set(None);
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.invalidate();
    }

    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        self.invalidate();
    }

    pub fn set_up(&mut self, up: Vec3) {
        self.up = up;
        self.invalidate();
    }

    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        self.position = eye;
        self.target = target;
        self.up = up;
        self.invalidate();
    }

    pub fn set_perspective(&mut self, fov: f32, aspect_ratio: f32, near: f32, far: f32) {
        self.fov = fov;
        self.aspect_ratio = aspect_ratio;
        self.near = near;
        self.far = far;
        self.invalidate();
    }

    pub fn set_fov(&mut self, fov: f32) {
        self.fov = fov;
        self.invalidate();
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
        self.invalidate();
    }

    pub fn set_near_far(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        self.invalidate();
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    pub fn near_far(&self) -> (f32, f32) {
        (self.near, self.far)
    }

    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(self.up).normalize_or_zero()
    }

    pub fn move_forward(&mut self, distance: f32) {
        self.position += self.forward() * distance;
        self.invalidate();
    }

    pub fn move_backward(&mut self, distance: f32) {
        self.move_forward(-distance);
    }

    pub fn move_left(&mut self, distance: f32) {
        self.position -= self.right() * distance;
        self.invalidate();
    }

    pub fn move_right(&mut self, distance: f32) {
        self.move_left(-distance);
    }

    /// Moves along the stored up vector, not the derived one.
    pub fn move_up(&mut self, distance: f32) {
        self.position += self.up * distance;
        self.invalidate();
    }

    pub fn move_down(&mut self, distance: f32) {
        self.move_up(-distance);
    }

    pub fn rotate_yaw(&mut self, angle: f32) {
        let (sin, cos) = angle.sin_cos();
        let forward = self.forward();
        let right = self.right();

        let new_forward = Vec3::new(
            forward.x * cos + right.x * sin,
            forward.y,
            forward.z * cos + right.z * sin,
        )
        .normalize_or_zero();

        self.target = self.position + new_forward;
        self.invalidate();
    }

    pub fn rotate_pitch(&mut self, angle: f32) {
        let (sin, cos) = angle.sin_cos();
        let forward = self.forward();
        let up = self.right().cross(forward);

        let new_forward = (forward * cos + up * sin).normalize_or_zero();

        self.target = self.position + new_forward;
        self.invalidate();
    }

    pub fn rotate_roll(&mut self, angle: f32) {
        let (sin, cos) = angle.sin_cos();
        let right = self.right();
        let up = right.cross(self.forward());

        self.up = (up * cos + right * sin).normalize_or_zero();
        self.invalidate();
    }

    fn matrices(&self) -> CameraMatrices {
        if let Some(matrices) = self.matrices.get() {
            return matrices;
        }

        let view = self.calculate_view();
        let projection = Mat4::perspective_rh(
            self.fov.to_radians(),
            self.aspect_ratio,
            self.near,
            self.far,
        );
        let matrices = CameraMatrices {
            view,
            projection,
            view_projection: projection * view,
        };
        self.matrices.set(Some(matrices));
        matrices
    }

    // Built by hand rather than with `Mat4::look_at_rh` so a degenerate basis
    // yields zeros instead of NaNs.
    fn calculate_view(&self) -> Mat4 {
        let forward = self.forward();
        let right = self.right();
        let up = right.cross(forward);

        Mat4::from_cols(
            Vec4::new(right.x, up.x, -forward.x, 0.0),
            Vec4::new(right.y, up.y, -forward.y, 0.0),
            Vec4::new(right.z, up.z, -forward.z, 0.0),
            Vec4::new(
                -right.dot(self.position),
                -up.dot(self.position),
                forward.dot(self.position),
                1.0,
            ),
        )
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.matrices().view
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.matrices().projection
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.matrices().view_projection
    }

    pub fn set_lua_script(&mut self, mut script: ScriptHost) {
        script.bind_to_camera();
        script.call_init(ScriptTarget::Camera(self));
        self.script = Some(script);
        log::info!("Camera script attached");
    }

    pub fn load_lua_script(&mut self, path: &Path, env: ScriptEnv) -> bool {
        let mut script = ScriptHost::new(env);
        if !script.load_from_file(path) {
            log::error!("Failed to load camera script {}", path.display());
            return false;
        }
        self.set_lua_script(script);
        true
    }

    pub fn script(&self) -> Option<&ScriptHost> {
        self.script.as_ref()
    }

    pub fn update(&mut self, delta_time: f32) {
        if let Some(mut script) = self.script.take() {
            script.call_update(delta_time, ScriptTarget::Camera(self));
            self.script = Some(script);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let camera = Camera::new();
        assert_eq!(camera.position(), Vec3::new(0.0, 0.0, 3.0));
        assert_eq!(camera.target(), Vec3::ZERO);
        assert_eq!(camera.up(), Vec3::Y);
        assert_eq!(camera.fov(), 45.0);
        assert_eq!(camera.near_far(), (0.1, 100.0));
    }

    #[test]
    fn view_matches_glam_look_at() {
        let mut camera = Camera::new();
        camera.look_at(Vec3::new(1.0, 2.0, 5.0), Vec3::new(0.0, 0.5, 0.0), Vec3::Y);
        let expected = Mat4::look_at_rh(Vec3::new(1.0, 2.0, 5.0), Vec3::new(0.0, 0.5, 0.0), Vec3::Y);
        assert!(camera.view_matrix().abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn cached_matrices_are_stable_until_a_setter_runs() {
        let mut camera = Camera::new();
        camera.set_position(Vec3::new(2.0, 1.0, 4.0));
        camera.rotate_yaw(0.3);

        let first = camera.view_matrix();
        let second = camera.view_matrix();
        assert_eq!(first.to_cols_array(), second.to_cols_array());

        camera.set_target(Vec3::new(1.0, 0.0, 0.0));
        assert_ne!(camera.view_matrix(), first);

        let projection = camera.projection_matrix();
        camera.set_fov(60.0);
        assert_ne!(camera.projection_matrix(), projection);
    }

    #[test]
    fn view_projection_is_product() {
        let camera = Camera::new();
        let expected = camera.projection_matrix() * camera.view_matrix();
        assert_eq!(camera.view_projection_matrix(), expected);
    }

    #[test]
    fn movement_follows_basis() {
        let mut camera = Camera::new();
        camera.move_forward(1.0);
        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, 0.0, 2.0), 1e-6));
        camera.move_backward(1.0);
        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, 0.0, 3.0), 1e-6));

        let mut camera = Camera::new();
        camera.move_right(1.0);
        assert!(camera.position().abs_diff_eq(Vec3::new(1.0, 0.0, 3.0), 1e-6));

        let mut camera = Camera::new();
        camera.move_left(1.0);
        assert!(camera.position().abs_diff_eq(Vec3::new(-1.0, 0.0, 3.0), 1e-6));

        let mut camera = Camera::new();
        camera.set_up(Vec3::new(0.0, 2.0, 0.0));
        camera.move_up(1.0);
        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, 2.0, 3.0), 1e-6));
    }

    #[test]
    fn yaw_turns_toward_right() {
        let mut camera = Camera::new();
        camera.rotate_yaw(std::f32::consts::FRAC_PI_2);
        assert!(camera.forward().abs_diff_eq(Vec3::X, 1e-5));
        assert!(camera.target().abs_diff_eq(Vec3::new(1.0, 0.0, 3.0), 1e-5));
    }

    #[test]
    fn pitch_and_roll() {
        let mut camera = Camera::new();
        camera.rotate_pitch(std::f32::consts::FRAC_PI_4);
        assert!(camera.forward().y > 0.0);

        let mut camera = Camera::new();
        camera.rotate_roll(std::f32::consts::FRAC_PI_2);
        assert!(camera.up().abs_diff_eq(Vec3::X, 1e-5));
    }

    #[test]
    fn degenerate_basis_has_no_nans() {
        let mut camera = Camera::new();
        camera.set_target(camera.position());
        assert!(!camera.view_matrix().is_nan());
    }
}
