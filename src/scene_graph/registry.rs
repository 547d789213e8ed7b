use std::{collections::HashMap, path::Path};

use itertools::Itertools;

use crate::{
    camera::Camera,
    hot_reload::WatchedFile,
    model::Model,
    rendering::{
        backend::RenderContext,
        material::{MaterialHandle, ShaderMaterial},
    },
    scene_graph::{
        entity::{Entity, EntityId},
        primitives::PrimitiveKind,
    },
    scripting::{ScriptEnv, ScriptHost, ScriptTarget},
};

/// Root of the scene. Owns every entity and material by name, the camera,
/// and the root script that builds the scene.
pub struct SceneRegistry {
    context: RenderContext,
    env: ScriptEnv,

    // Sorted by id, which is also insertion order.
    objects: Vec<Entity>,
    object_index: HashMap<String, EntityId>,
    next_object_id: u64,

    materials: Vec<MaterialHandle>,
    material_index: HashMap<String, MaterialHandle>,

    camera: Option<Camera>,

    script: Option<ScriptHost>,
    script_file: Option<WatchedFile>,
    hot_reload: bool,
}

impl SceneRegistry {
    pub fn new(context: RenderContext, env: ScriptEnv) -> Self {
        Self {
            context,
            env,
            objects: Vec::new(),
            object_index: HashMap::new(),
            next_object_id: 0,
            materials: Vec::new(),
            material_index: HashMap::new(),
            camera: None,
            script: None,
            script_file: None,
            hot_reload: false,
        }
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn env(&self) -> &ScriptEnv {
        &self.env
    }

    fn insert_object(&mut self, name: &str, entity: Entity) -> &mut Entity {
        let id = EntityId(self.next_object_id);
        self.next_object_id += 1;

        self.object_index.insert(name.to_string(), id);
        self.objects.push(entity.with_id(id));
        log::info!("Created object {name}");

        let last = self.objects.len() - 1;
        &mut self.objects[last]
    }

    fn object_position(&self, name: &str) -> Option<usize> {
        let id = self.object_index.get(name)?;
        self.objects.binary_search_by_key(id, Entity::id).ok()
    }

    pub fn create_object(&mut self, name: &str, kind: &str) -> Option<&mut Entity> {
        if self.object_index.contains_key(name) {
            log::warn!("Object {name} already exists");
            return None;
        }

        let kind: PrimitiveKind = match kind.parse() {
            Ok(kind) => kind,
            Err(e) => {
                log::error!("Cannot create object {name}: {e}");
                return None;
            }
        };

        let mut entity = Entity::new(name, self.context.clone());
        if !entity.initialize_primitive(kind) {
            return None;
        }

        Some(self.insert_object(name, entity))
    }

    pub fn create_model_object(&mut self, name: &str, path: &Path) -> Option<&mut Entity> {
        if self.object_index.contains_key(name) {
            log::warn!("Object {name} already exists");
            return None;
        }

        let model = match Model::load(&self.context, path) {
            Ok(model) => model,
            Err(e) => {
                log::error!("Cannot create model object {name}: {e:#}");
                return None;
            }
        };

        let mut entity = Entity::new(name, self.context.clone());
        entity.initialize_model(model);
        Some(self.insert_object(name, entity))
    }

    /// Compiles a material from two shader files. Nothing is inserted when
    /// compilation fails.
    pub fn create_shader(
        &mut self,
        name: &str,
        vertex_path: &Path,
        fragment_path: &Path,
    ) -> Option<MaterialHandle> {
        if self.material_index.contains_key(name) {
            log::warn!("Shader {name} already exists");
            return None;
        }

        let mut material = ShaderMaterial::new(name, self.context.clone());
        if !material.compile_from_files(vertex_path, fragment_path) {
            log::error!("Failed to create shader {name}");
            return None;
        }
        material.enable_hot_reload(self.hot_reload);

        let material = material.into_handle();
        self.materials.push(material.clone());
        self.material_index.insert(name.to_string(), material.clone());
        log::info!("Created shader {name}");
        Some(material)
    }

    pub fn attach_shader_to_object(&mut self, object_name: &str, shader_name: &str) -> bool {
        let Some(material) = self.material_index.get(shader_name).cloned() else {
            log::warn!("Shader {shader_name} not found");
            return false;
        };
        let Some(entity) = self.get_object_by_name_mut(object_name) else {
            log::warn!("Object {object_name} not found");
            return false;
        };

        entity.set_material(material);
        true
    }

    pub fn attach_script_to_object(&mut self, object_name: &str, path: &Path) -> bool {
        let env = self.env.clone();
        let Some(entity) = self.get_object_by_name_mut(object_name) else {
            log::warn!("Object {object_name} not found");
            return false;
        };

        entity.load_lua_script(path, env)
    }

    pub fn get_object_by_name(&self, name: &str) -> Option<&Entity> {
        self.object_position(name).map(|index| &self.objects[index])
    }

    pub fn get_object_by_name_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.object_position(name).map(|index| &mut self.objects[index])
    }

    pub fn with_object<R>(&mut self, name: &str, f: impl FnOnce(&mut Entity) -> R) -> Option<R> {
        let result = self.get_object_by_name_mut(name).map(f);
        if result.is_none() {
            log::warn!("Object {name} not found");
        }
        result
    }

    pub fn get_material_by_name(&self, name: &str) -> Option<&MaterialHandle> {
        self.material_index.get(name)
    }

    pub fn remove_object(&mut self, name: &str) -> bool {
        let Some(index) = self.object_position(name) else {
            log::warn!("Object {name} not found");
            return false;
        };

        self.objects.remove(index);
        self.object_index.remove(name);
        log::info!("Removed object {name}");
        true
    }

    pub fn list_objects(&self) -> Vec<String> {
        let names: Vec<String> = self
            .objects
            .iter()
            .map(|entity| entity.name().to_string())
            .collect();

        log::info!(
            "{} objects, {} shaders: {}",
            names.len(),
            self.materials.len(),
            names.iter().join(", ")
        );
        names
    }

    pub fn objects(&self) -> &[Entity] {
        &self.objects
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        self.camera.as_mut()
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = Some(camera);
        log::info!("Camera set");
    }

    pub fn clear_scene(&mut self) {
        self.objects.clear();
        self.object_index.clear();
        self.materials.clear();
        self.material_index.clear();
        log::info!("Scene cleared");
    }

    pub fn set_lua_script(&mut self, mut script: ScriptHost) {
        script.bind_to_scene();
        self.script = None;
        script.call_init(ScriptTarget::Scene(self));

        // `init` may have reloaded the scene, which installs a newer script.
        if self.script.is_none() {
            self.script = Some(script);
        }
        log::info!("Root script attached");
    }

    pub fn load_lua_script(&mut self, path: &Path) -> bool {
        self.script_file = Some(WatchedFile::new(path));

        let mut script = ScriptHost::new(self.env.clone());
        if !script.load_from_file(path) {
            log::error!("Failed to load root script {}", path.display());
            return false;
        }
        self.set_lua_script(script);
        true
    }

    pub fn script(&self) -> Option<&ScriptHost> {
        self.script.as_ref()
    }

    /// Clears the scene and runs the root script file again from the top.
    /// The scene stays empty if the script then fails to load.
    pub fn reload_script(&mut self) -> bool {
        let Some(file) = self.script_file.as_mut() else {
            log::warn!("No root script to reload");
            return false;
        };
        file.mark_current();
        let path = file.path().to_path_buf();

        log::info!("Reloading root script {}", path.display());
        self.clear_scene();

        let mut script = ScriptHost::new(self.env.clone());
        if !script.load_from_file(&path) {
            log::error!("Failed to reload root script {}", path.display());
            return false;
        }
        self.set_lua_script(script);
        true
    }

    pub fn enable_hot_reload(&mut self, enabled: bool) {
        self.hot_reload = enabled;
        for material in &self.materials {
            material.borrow_mut().enable_hot_reload(enabled);
        }
    }

    fn poll_script_file(&mut self) {
        if !self.hot_reload {
            return;
        }
        let changed = self
            .script_file
            .as_mut()
            .is_some_and(|file| file.poll());
        if changed {
            log::info!("Root script changed on disk");
            self.reload_script();
        }
    }

    pub fn update(&mut self, delta_time: f32) {
        self.poll_script_file();
        for material in &self.materials {
            material.borrow_mut().check_and_reload();
        }

        if let Some(mut script) = self.script.take() {
            script.call_update(delta_time, ScriptTarget::Scene(self));
            if self.script.is_none() {
                self.script = Some(script);
            }
        }

        if let Some(camera) = &mut self.camera {
            camera.update(delta_time);
        }

        for object in &mut self.objects {
            if object.is_initialized() {
                object.update(delta_time);
            }
        }
    }

    /// Runs the root render hook and draws every initialized object. Camera
    /// matrices reach objects that have a script and a compiled material.
    pub fn render(&mut self) {
        if let Some(mut script) = self.script.take() {
            script.call_render(ScriptTarget::Scene(self));
            if self.script.is_none() {
                self.script = Some(script);
            }
        }

        let time = self.env.clock.elapsed_secs() as f32;
        let camera = self
            .camera
            .as_ref()
            .map(|camera| (camera.view_matrix(), camera.projection_matrix()));

        for object in &mut self.objects {
            if !object.is_initialized() {
                continue;
            }

            if let Some((view, projection)) = camera.filter(|_| object.has_script()) {
                if let Some(material) = object.material() {
                    let mut material = material.borrow_mut();
                    if material.is_compiled() {
                        material.set_uniform("viewMatrix", view);
                        material.set_uniform("projectionMatrix", projection);
                    }
                }
            }

            object.render(time);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::rendering::headless::HeadlessBackend;

    fn registry() -> (Rc<HeadlessBackend>, SceneRegistry) {
        let backend = Rc::new(HeadlessBackend::new());
        let registry = SceneRegistry::new(backend.clone(), ScriptEnv::default());
        (backend, registry)
    }

    #[test]
    fn created_objects_are_found_by_name_and_initialized() {
        let (_backend, mut registry) = registry();
        for kind in ["rectangle", "triangle"] {
            let id = registry.create_object(kind, kind).unwrap().id();

            let found = registry.get_object_by_name(kind).unwrap();
            assert_eq!(found.id(), id);
            assert_eq!(found.name(), kind);
            assert!(found.is_initialized());
        }
        assert_eq!(registry.object_count(), 2);
    }

    #[test]
    fn rejects_duplicate_and_unknown_objects() {
        let (_backend, mut registry) = registry();
        assert!(registry.create_object("a", "triangle").is_some());
        assert!(registry.create_object("a", "rectangle").is_none());
        assert!(registry.create_object("b", "hexagon").is_none());
        assert!(registry.create_object("c", "Rectangle").is_none());
        assert_eq!(registry.object_count(), 1);
    }

    #[test]
    fn remove_keeps_index_and_collection_in_sync() {
        let (backend, mut registry) = registry();
        for name in ["a", "b", "c"] {
            registry.create_object(name, "rectangle");
        }

        assert!(registry.remove_object("b"));
        assert!(!registry.remove_object("b"));
        assert!(registry.get_object_by_name("b").is_none());
        assert_eq!(registry.get_object_by_name("c").unwrap().name(), "c");
        assert_eq!(registry.list_objects(), vec!["a", "c"]);
        assert_eq!(backend.live_geometry_count(), 2);
    }

    #[test]
    fn attach_requires_both_names() {
        let (_backend, mut registry) = registry();
        registry.create_object("a", "triangle");
        assert!(!registry.attach_shader_to_object("a", "missing"));
        assert!(!registry.attach_shader_to_object("missing", "missing"));
        assert!(!registry.attach_script_to_object("missing", Path::new("x.lua")));
    }

    #[test]
    fn clear_scene_keeps_camera() {
        let (_backend, mut registry) = registry();
        registry.set_camera(Camera::new());
        registry.create_object("a", "triangle");
        registry.clear_scene();
        assert_eq!(registry.object_count(), 0);
        assert!(registry.camera().is_some());
    }

    #[test]
    fn reload_without_script_fails() {
        let (_backend, mut registry) = registry();
        assert!(!registry.reload_script());
    }
}
