use std::{
    fs::File,
    path::{Path, PathBuf},
    rc::Rc,
    time::{Duration, SystemTime},
};

use glam::{Mat4, Vec3};
use scenegine::{
    camera::Camera,
    rendering::headless::HeadlessBackend,
    scene_graph::SceneRegistry,
    scripting::ScriptEnv,
};
use tempfile::TempDir;

const VERTEX: &str = include_str!("../assets/shaders/basic.vert.wgsl");
const FRAGMENT: &str = include_str!("../assets/shaders/basic.frag.wgsl");

struct Scene {
    dir: TempDir,
    backend: Rc<HeadlessBackend>,
    registry: SceneRegistry,
}

impl Scene {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("basic.vert.wgsl"), VERTEX).unwrap();
        std::fs::write(dir.path().join("basic.frag.wgsl"), FRAGMENT).unwrap();

        let backend = Rc::new(HeadlessBackend::new());
        let registry = SceneRegistry::new(backend.clone(), ScriptEnv::default());
        Self {
            dir,
            backend,
            registry,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// A Lua string literal for a file in the scene directory.
    fn lua_path(&self, name: &str) -> String {
        format!("{:?}", self.path(name).display().to_string())
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn create_basic_shader(&mut self, name: &str) {
        let vertex = self.path("basic.vert.wgsl");
        let fragment = self.path("basic.frag.wgsl");
        assert!(self
            .registry
            .create_shader(name, &vertex, &fragment)
            .is_some());
    }
}

/// Moves the file's modification time into the future so the next poll sees
/// it as changed.
fn touch(path: &Path, ahead_secs: u64) {
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(ahead_secs))
        .unwrap();
}

fn matrix_at(bytes: &[u8], offset: usize) -> Mat4 {
    let floats: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes[offset..offset + 64]);
    Mat4::from_cols_slice(&floats)
}

#[test]
fn reload_replaces_scene_with_script_contents() {
    let mut scene = Scene::new();
    let script = scene.write(
        "root.lua",
        r#"
        function init()
            createObject("only", "triangle")
        end
        "#,
    );

    assert!(scene.registry.load_lua_script(&script));
    scene.registry.create_object("extra1", "rectangle");
    scene.registry.create_object("extra2", "rectangle");
    assert_eq!(scene.registry.object_count(), 3);

    assert!(scene.registry.reload_script());
    assert_eq!(scene.registry.list_objects(), vec!["only"]);
    assert_eq!(scene.backend.live_geometry_count(), 1);
}

#[test]
fn root_script_builds_scene_with_child_scripts() {
    let mut scene = Scene::new();
    scene.write(
        "child.lua",
        r#"
        function update(dt)
            position.x = position.x + 1
        end
        "#,
    );
    let source = format!(
        r#"
        function init()
            assert(createShader("basic", {vs}, {fs}))
            assert(createObject("a", "triangle"))
            assert(createObject("b", "rectangle"))
            assert(attachShaderToObject("a", "basic"))
            assert(attachShaderToObject("b", "basic"))
            assert(attachScriptToObject("a", {child}))
            assert(not attachScriptToObject("missing", {child}))
            setObjectPosition("b", 0, 2, 0)
        end
        "#,
        vs = scene.lua_path("basic.vert.wgsl"),
        fs = scene.lua_path("basic.frag.wgsl"),
        child = scene.lua_path("child.lua"),
    );
    let script = scene.write("root.lua", &source);

    assert!(scene.registry.load_lua_script(&script));
    assert_eq!(scene.registry.material_count(), 1);
    assert!(scene.registry.get_object_by_name("a").unwrap().has_script());

    scene.registry.update(0.016);
    scene.registry.update(0.016);
    let a = scene.registry.get_object_by_name("a").unwrap();
    assert_eq!(a.position(), Vec3::new(2.0, 0.0, 0.0));
    let b = scene.registry.get_object_by_name("b").unwrap();
    assert_eq!(b.position(), Vec3::new(0.0, 2.0, 0.0));

    scene.registry.render();
    assert_eq!(scene.backend.draws().len(), 2);
}

#[test]
fn root_script_queries_and_edits_objects() {
    let mut scene = Scene::new();
    let script = scene.write(
        "root.lua",
        r#"
        function init()
            createObject("a", "triangle")
            createObject("b", "triangle")
            createObject("c", "triangle")
            removeObject("b")
        end

        function update(dt)
            local names = listObjects()
            assert(#names == 2 and names[1] == "a" and names[2] == "c")
            assert(getObjectByName("a") and not getObjectByName("b"))

            local x, y, z = getObjectPosition("a")
            setObjectPosition("a", x + 1, y, z)
            setObjectColor("c", 1, 0, 0)
            setObjectVisible("c", false)

            -- Unknown names read as defaults.
            local sx, sy, sz = getObjectScale("missing")
            assert(sx == 1 and sy == 1 and sz == 1)
            assert(not isObjectVisible("missing"))
        end
        "#,
    );

    assert!(scene.registry.load_lua_script(&script));
    scene.registry.update(0.016);

    let a = scene.registry.get_object_by_name("a").unwrap();
    assert_eq!(a.position(), Vec3::X);
    let c = scene.registry.get_object_by_name("c").unwrap();
    assert_eq!(c.color().x, 1.0);
    assert_eq!(c.color().y, 0.0);
    assert!(!c.is_visible());
}

#[test]
fn failed_reload_leaves_scene_empty() {
    let mut scene = Scene::new();
    let script = scene.write(
        "root.lua",
        r#"
        function init()
            createObject("a", "triangle")
        end
        "#,
    );
    assert!(scene.registry.load_lua_script(&script));

    scene.write("root.lua", "function init( createObject(");
    assert!(!scene.registry.reload_script());
    assert_eq!(scene.registry.object_count(), 0);
    assert!(scene.registry.script().is_some());

    // The old script still runs without a scene to work on.
    scene.registry.update(0.016);
    scene.registry.render();
}

#[test]
fn edited_root_script_is_reloaded_on_update() {
    let mut scene = Scene::new();
    scene.registry.enable_hot_reload(true);
    let script = scene.write(
        "root.lua",
        r#"
        function init()
            createObject("before", "triangle")
        end
        "#,
    );
    assert!(scene.registry.load_lua_script(&script));

    scene.registry.update(0.016);
    assert!(scene.registry.get_object_by_name("before").is_some());

    scene.write(
        "root.lua",
        r#"
        function init()
            createObject("after", "rectangle")
        end
        "#,
    );
    touch(&script, 60);
    scene.registry.update(0.016);
    assert_eq!(scene.registry.list_objects(), vec!["after"]);

    // Unchanged since the reload.
    scene.registry.update(0.016);
    assert_eq!(scene.registry.list_objects(), vec!["after"]);
}

#[test]
fn hot_reload_disabled_ignores_edits() {
    let mut scene = Scene::new();
    let script = scene.write("root.lua", r#"function init() createObject("a", "triangle") end"#);
    assert!(scene.registry.load_lua_script(&script));

    scene.write("root.lua", r#"function init() createObject("b", "triangle") end"#);
    touch(&script, 60);
    scene.registry.update(0.016);
    assert_eq!(scene.registry.list_objects(), vec!["a"]);
}

#[test]
fn shader_edit_recompiles_once() {
    let mut scene = Scene::new();
    scene.registry.enable_hot_reload(true);
    scene.create_basic_shader("basic");
    let created = scene.backend.program_creations();

    scene.registry.update(0.016);
    assert_eq!(scene.backend.program_creations(), created);

    touch(&scene.path("basic.frag.wgsl"), 60);
    scene.registry.update(0.016);
    scene.registry.update(0.016);
    assert_eq!(scene.backend.program_creations(), created + 1);
    assert_eq!(scene.backend.live_program_count(), 1);
}

#[test]
fn broken_shader_edit_keeps_previous_program() {
    let mut scene = Scene::new();
    scene.registry.enable_hot_reload(true);
    scene.create_basic_shader("basic");
    scene.registry.create_object("a", "triangle");
    scene.registry.attach_shader_to_object("a", "basic");

    let fragment = scene.write("basic.frag.wgsl", "@fragment fn fs_main( {");
    touch(&fragment, 60);
    scene.registry.update(0.016);

    let material = scene.registry.get_material_by_name("basic").unwrap();
    assert!(material.borrow().is_compiled());
    scene.registry.render();
    assert_eq!(scene.backend.draws().len(), 1);
}

#[test]
fn camera_matrices_reach_scripted_objects_only() {
    let mut scene = Scene::new();
    scene.create_basic_shader("plain");
    scene.create_basic_shader("scripted");
    let child = scene.write("child.lua", "function update(dt) end");

    let mut camera = Camera::new();
    camera.look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
    let view = camera.view_matrix();
    scene.registry.set_camera(camera);

    scene.registry.create_object("plain", "triangle");
    scene.registry.attach_shader_to_object("plain", "plain");
    scene.registry.create_object("scripted", "triangle");
    scene.registry.attach_shader_to_object("scripted", "scripted");
    assert!(scene.registry.attach_script_to_object("scripted", &child));

    scene.registry.render();
    let draws = scene.backend.draws();
    assert_eq!(draws.len(), 2);

    // viewMatrix follows modelMatrix in the uniform block.
    assert_eq!(matrix_at(&draws[0].uniforms, 64), Mat4::ZERO);
    assert_eq!(matrix_at(&draws[1].uniforms, 64), view);
}

#[test]
fn script_errors_do_not_stop_the_frame() {
    let mut scene = Scene::new();
    scene.create_basic_shader("basic");
    let broken = scene.write(
        "broken.lua",
        r#"
        function update(dt)
            error("update failed")
        end
        function render()
            local x = nil
            return x.field
        end
        "#,
    );
    let root = scene.write(
        "root.lua",
        r#"
        function update(dt)
            undefinedFunction()
        end
        "#,
    );
    assert!(scene.registry.load_lua_script(&root));

    for name in ["a", "b"] {
        scene.registry.create_object(name, "triangle");
        scene.registry.attach_shader_to_object(name, "basic");
    }
    assert!(scene.registry.attach_script_to_object("a", &broken));

    scene.registry.update(0.016);
    scene.registry.render();
    assert_eq!(scene.backend.draws().len(), 2);
}

#[test]
fn script_can_reload_itself() {
    let mut scene = Scene::new();
    let script = scene.write(
        "root.lua",
        r#"
        local frames = 0

        function init()
            createObject("a", "triangle")
        end

        function update(dt)
            frames = frames + 1
            if frames == 2 then
                reloadScript()
            end
        end
        "#,
    );
    assert!(scene.registry.load_lua_script(&script));
    scene.registry.create_object("extra", "triangle");

    scene.registry.update(0.016);
    assert_eq!(scene.registry.object_count(), 2);
    scene.registry.update(0.016);
    assert_eq!(scene.registry.list_objects(), vec!["a"]);

    // The reloaded script counts from zero again.
    scene.registry.update(0.016);
    assert_eq!(scene.registry.list_objects(), vec!["a"]);
}
