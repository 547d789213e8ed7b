use std::rc::Rc;

use crate::{
    camera::Camera,
    config::EngineConfig,
    input::InputState,
    rendering::{backend::RenderContext, headless::HeadlessBackend},
    scene_graph::SceneRegistry,
    scripting::{EngineClock, ScriptEnv},
};

pub const HEADLESS_FRAME_TIME: f32 = 1.0 / 60.0;

/// Drives one scene: input, update and render, once per frame.
pub struct Engine {
    registry: SceneRegistry,
    input: Rc<InputState>,
    config: EngineConfig,
}

impl Engine {
    /// Builds the scene described by `config`: a default camera, the camera
    /// script and the root script, in that order.
    pub fn from_config(config: EngineConfig, context: RenderContext) -> Self {
        let input = Rc::new(InputState::new());
        let env = ScriptEnv::new(EngineClock::new(), Some(input.clone()));

        let mut registry = SceneRegistry::new(context, env.clone());
        registry.enable_hot_reload(config.scene.hot_reload);

        let mut camera = Camera::new();
        camera.set_aspect_ratio(config.window.width as f32 / config.window.height.max(1) as f32);
        if let Some(path) = &config.scene.camera_script {
            camera.load_lua_script(path, env);
        }
        registry.set_camera(camera);

        if let Some(path) = &config.scene.root_script {
            registry.load_lua_script(path);
        }

        Self {
            registry,
            input,
            config,
        }
    }

    pub fn registry(&self) -> &SceneRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SceneRegistry {
        &mut self.registry
    }

    pub fn input(&self) -> &Rc<InputState> {
        &self.input
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        if let Some(camera) = self.registry.camera_mut() {
            camera.set_aspect_ratio(aspect_ratio);
        }
    }

    pub fn frame(&mut self, delta_time: f32) {
        self.input.begin_frame();
        self.registry.update(delta_time);
        self.registry.render();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessReport {
    pub frames: u32,
    pub objects: usize,
    pub draws: usize,
}

pub fn run_headless(config: EngineConfig, frames: u32) -> HeadlessReport {
    let backend = Rc::new(HeadlessBackend::new());
    let mut engine = Engine::from_config(config, backend.clone());

    let mut draws = 0;
    for _ in 0..frames {
        engine.frame(HEADLESS_FRAME_TIME);
        draws += backend.draws().len();
        backend.take_commands();
    }

    let report = HeadlessReport {
        frames,
        objects: engine.registry().object_count(),
        draws,
    };
    log::info!(
        "Ran {} frames headless: {} objects, {} draws",
        report.frames,
        report.objects,
        report.draws
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_runs() {
        let report = run_headless(EngineConfig::default(), 3);
        assert_eq!(
            report,
            HeadlessReport {
                frames: 3,
                objects: 0,
                draws: 0
            }
        );
    }

    #[test]
    fn camera_gets_window_aspect() {
        let backend = Rc::new(HeadlessBackend::new());
        let engine = Engine::from_config(EngineConfig::default(), backend);
        let camera = engine.registry().camera().unwrap();
        assert!((camera.aspect_ratio() - 1280.0 / 720.0).abs() < 1e-6);
    }
}
