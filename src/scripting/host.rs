use std::path::{Path, PathBuf};

use anyhow::Context;
use mlua::{Function, Lua};

use crate::{
    camera::Camera,
    scene_graph::{entity::Entity, registry::SceneRegistry},
    scripting::{
        api::{self, HostContext},
        env::ScriptEnv,
    },
};

/// Chunk name used for scripts loaded from a string.
pub const INLINE_SOURCE: &str = "<inline>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    None,
    File(PathBuf),
    Inline,
}

/// What kind of target a host acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptBinding {
    #[default]
    Unbound,
    Object,
    Camera,
    Scene,
}

/// The state a script call may read and mutate. It is borrowed only for the
/// duration of the call.
pub enum ScriptTarget<'a> {
    Detached,
    Object(&'a mut Entity),
    Camera(&'a mut Camera),
    Scene(&'a mut SceneRegistry),
}

impl ScriptTarget<'_> {
    pub fn binding(&self) -> ScriptBinding {
        match self {
            ScriptTarget::Detached => ScriptBinding::Unbound,
            ScriptTarget::Object(_) => ScriptBinding::Object,
            ScriptTarget::Camera(_) => ScriptBinding::Camera,
            ScriptTarget::Scene(_) => ScriptBinding::Scene,
        }
    }
}

/// One Lua state, bound to at most one kind of target.
pub struct ScriptHost {
    lua: Lua,
    env: ScriptEnv,
    source: ScriptSource,
    loaded: bool,
    binding: ScriptBinding,
}

impl ScriptHost {
    pub fn new(env: ScriptEnv) -> Self {
        let lua = api::create_context(&env).expect("Failed to create a Lua context");
        Self {
            lua,
            env,
            source: ScriptSource::None,
            loaded: false,
            binding: ScriptBinding::Unbound,
        }
    }

    pub fn env(&self) -> &ScriptEnv {
        &self.env
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn source(&self) -> &ScriptSource {
        &self.source
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            ScriptSource::File(path) => Some(path),
            _ => None,
        }
    }

    pub fn binding(&self) -> ScriptBinding {
        self.binding
    }

    /// Executes the file in this host's Lua state. The path is remembered
    /// even when loading fails so that [`ScriptHost::reload`] can retry.
    pub fn load_from_file(&mut self, path: &Path) -> bool {
        self.source = ScriptSource::File(path.to_path_buf());

        let result = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))
            .and_then(|text| self.execute(&text, &path.display().to_string()));

        self.finish_load(result)
    }

    pub fn load_from_string(&mut self, text: &str) -> bool {
        self.source = ScriptSource::Inline;
        let result = self.execute(text, INLINE_SOURCE);
        self.finish_load(result)
    }

    fn execute(&self, text: &str, chunk_name: &str) -> anyhow::Result<()> {
        self.lua
            .load(text)
            .set_name(chunk_name)
            .exec()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("Failed to execute script {chunk_name}"))
    }

    fn finish_load(&mut self, result: anyhow::Result<()>) -> bool {
        match result {
            Ok(()) => {
                log::info!("Loaded script {}", self.describe_source());
                self.loaded = true;
            }
            Err(e) => {
                log::error!("{e:#}");
                self.loaded = false;
            }
        }
        self.loaded
    }

    fn describe_source(&self) -> String {
        match &self.source {
            ScriptSource::None => "<none>".to_string(),
            ScriptSource::File(path) => path.display().to_string(),
            ScriptSource::Inline => INLINE_SOURCE.to_string(),
        }
    }

    /// Discards all script state and runs the file again in a fresh Lua state.
    /// Scripts loaded from a string cannot be reloaded.
    pub fn reload(&mut self) -> bool {
        let ScriptSource::File(path) = self.source.clone() else {
            log::warn!("Script {} has no file to reload", self.describe_source());
            return false;
        };

        match api::create_context(&self.env) {
            Ok(lua) => self.lua = lua,
            Err(e) => {
                log::error!("Failed to create a Lua context: {e}");
                return false;
            }
        }
        self.loaded = false;
        self.load_from_file(&path)
    }

    pub fn bind_to_object(&mut self) {
        self.binding = ScriptBinding::Object;
    }

    pub fn bind_to_camera(&mut self) {
        self.binding = ScriptBinding::Camera;
    }

    pub fn bind_to_scene(&mut self) {
        self.binding = ScriptBinding::Scene;
    }

    pub fn call_init(&mut self, target: ScriptTarget<'_>) {
        self.invoke("init", target, None);
    }

    pub fn call_update(&mut self, delta_time: f32, target: ScriptTarget<'_>) {
        self.invoke("update", target, Some(delta_time));
    }

    pub fn call_render(&mut self, target: ScriptTarget<'_>) {
        self.invoke("render", target, None);
    }

    /// Calls a zero-argument global function. Returns false if it is missing
    /// or raised an error.
    pub fn call_function(&mut self, name: &str, target: ScriptTarget<'_>) -> bool {
        self.invoke(name, target, None)
    }

    fn invoke(&self, name: &str, target: ScriptTarget<'_>, delta_time: Option<f32>) -> bool {
        if !self.loaded {
            return false;
        }

        let function = match self.lua.globals().get::<Option<Function>>(name) {
            Ok(Some(function)) => function,
            Ok(None) => return false,
            Err(e) => {
                log::error!("Lua {name}() lookup error: {e}");
                return false;
            }
        };

        let target = if target.binding() == self.binding {
            target
        } else {
            if !matches!(target, ScriptTarget::Detached) {
                log::warn!(
                    "Script {} is bound as {:?} but was called with a {:?} target",
                    self.describe_source(),
                    self.binding,
                    target.binding()
                );
            }
            ScriptTarget::Detached
        };

        let context = HostContext::new(target);
        let result = self.lua.scope(|scope| {
            api::install_target_functions(&self.lua, scope, &context)?;

            match delta_time {
                Some(delta_time) => {
                    let published = api::publish_transform(&self.lua, &context)?;
                    function.call::<()>(delta_time)?;
                    api::apply_transform(&self.lua, &context, &published)
                }
                None => function.call::<()>(()),
            }
        });

        // The scoped functions are destroyed with the scope.
        if let Err(e) = api::restore_stubs(&self.lua) {
            log::error!("Failed to restore script stubs: {e}");
        }

        match result {
            Ok(()) => true,
            Err(e) => {
                log::error!("Lua {name}() error: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use glam::Vec3;

    use super::*;
    use crate::{
        input::{codes, InputState},
        rendering::{backend::RenderContext, headless::HeadlessBackend},
    };

    fn host() -> ScriptHost {
        ScriptHost::new(ScriptEnv::default())
    }

    fn entity() -> Entity {
        let context: RenderContext = Rc::new(HeadlessBackend::new());
        Entity::new("test", context)
    }

    #[test]
    fn missing_entry_points_are_skipped() {
        let mut host = host();
        assert!(host.load_from_string("x = 1"));
        host.call_init(ScriptTarget::Detached);
        assert!(!host.call_function("nothing", ScriptTarget::Detached));
    }

    #[test]
    fn syntax_error_leaves_host_unloaded() {
        let mut host = host();
        assert!(!host.load_from_string("function ("));
        assert!(!host.is_loaded());
        assert_eq!(host.source(), &ScriptSource::Inline);
    }

    #[test]
    fn missing_file_fails_but_keeps_path() {
        let mut host = host();
        assert!(!host.load_from_file(Path::new("does/not/exist.lua")));
        assert_eq!(host.path(), Some(Path::new("does/not/exist.lua")));
    }

    #[test]
    fn runtime_errors_are_contained() {
        let mut host = host();
        assert!(host.load_from_string(
            r#"
            calls = 0
            function boom() calls = calls + 1; error("kaboom") end
            function ok() calls = calls + 1 end
            "#
        ));
        assert!(!host.call_function("boom", ScriptTarget::Detached));
        assert!(host.call_function("ok", ScriptTarget::Detached));
        assert_eq!(host.lua.globals().get::<i64>("calls").unwrap(), 2);
    }

    #[test]
    fn inline_scripts_cannot_reload() {
        let mut host = host();
        assert!(host.load_from_string("x = 1"));
        assert!(!host.reload());
        assert!(host.is_loaded());
    }

    #[test]
    fn reload_discards_script_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("counter.lua");
        std::fs::write(&path, "counter = (counter or 0) + 1").unwrap();

        let mut host = host();
        assert!(host.load_from_file(&path));
        host.lua.load("counter = counter + 10").exec().unwrap();
        assert!(host.reload());
        assert_eq!(host.lua.globals().get::<i64>("counter").unwrap(), 1);
    }

    #[test]
    fn bound_entity_is_mutated_through_host_functions() {
        let mut entity = entity();
        let mut host = host();
        assert!(host.load_from_string(
            r#"
            function init()
                setPosition(1, 2)
                setColor(0.5, 0.5, 0.5)
                setVisible(false)
            end
            "#
        ));
        host.bind_to_object();
        host.call_init(ScriptTarget::Object(&mut entity));

        assert_eq!(entity.position(), Vec3::new(1.0, 2.0, 0.0));
        assert_eq!(entity.color().w, 1.0);
        assert!(!entity.is_visible());
    }

    #[test]
    fn host_functions_are_no_ops_again_after_a_bound_call() {
        let mut entity = entity();
        let mut host = host();
        assert!(host.load_from_string("function init() setPosition(1, 2, 3) end"));
        host.bind_to_object();
        host.call_init(ScriptTarget::Object(&mut entity));
        assert_eq!(entity.position(), Vec3::new(1.0, 2.0, 3.0));

        // Top-level code runs with no target.
        assert!(host.load_from_string("setPosition(4, 5, 6) assert(getPosition() == nil)"));
        assert!(host.call_function("init", ScriptTarget::Detached));
        assert_eq!(entity.position(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn unbound_host_functions_are_no_ops() {
        let mut entity = entity();
        let mut host = host();
        assert!(host.load_from_string("function init() setPosition(5, 5, 5) end"));

        // Not bound to an object, so the entity target is refused.
        host.call_init(ScriptTarget::Object(&mut entity));
        assert_eq!(entity.position(), Vec3::ZERO);
    }

    #[test]
    fn update_publishes_and_pulls_transform_globals() {
        let mut entity = entity();
        entity.set_position(Vec3::new(1.0, 0.0, 0.0));

        let mut host = host();
        assert!(host.load_from_string(
            r#"
            function update(dt)
                seen = position.x
                position.x = position.x + dt
                setScale(2, 2, 2)
            end
            "#
        ));
        host.bind_to_object();
        host.call_update(0.5, ScriptTarget::Object(&mut entity));

        assert_eq!(host.lua.globals().get::<f32>("seen").unwrap(), 1.0);
        assert_eq!(entity.position(), Vec3::new(1.5, 0.0, 0.0));
        // Untouched table does not overwrite a setter call.
        assert_eq!(entity.scale(), Vec3::splat(2.0));
    }

    #[test]
    fn camera_scripts_move_the_camera() {
        let mut camera = Camera::new();
        let mut host = host();
        assert!(host.load_from_string(
            r#"
            function update(dt)
                moveForward(1)
                fov = getFOV()
            end
            "#
        ));
        host.bind_to_camera();
        host.call_update(0.016, ScriptTarget::Camera(&mut camera));

        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, 0.0, 2.0), 1e-6));
        assert_eq!(host.lua.globals().get::<f32>("fov").unwrap(), 45.0);
    }

    #[test]
    fn input_queries_read_the_input_surface() {
        let input = Rc::new(InputState::new());
        input.set_key(codes::KEY_W, true);

        let mut host = ScriptHost::new(ScriptEnv::new(Default::default(), Some(input.clone())));
        assert!(host.load_from_string("w = isKeyPressed(KEY_W()); s = isKeyPressed(KEY_S())"));
        assert!(host.lua.globals().get::<bool>("w").unwrap());
        assert!(!host.lua.globals().get::<bool>("s").unwrap());
    }
}
