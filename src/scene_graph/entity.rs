use std::path::Path;

use glam::{Mat4, Vec3, Vec4};

use crate::{
    model::Model,
    rendering::{
        backend::{DrawCall, DrawRange, GeometryId, GpuGeometry, RenderContext, TextureId},
        material::MaterialHandle,
    },
    scene_graph::{primitives::PrimitiveKind, transform::Transform},
    scripting::{ScriptEnv, ScriptHost, ScriptTarget},
};

/// Registry-assigned identity. Ids grow monotonically and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EntityId(pub u64);

enum Geometry {
    Primitive {
        kind: PrimitiveKind,
        buffers: GpuGeometry,
    },
    Model(Model),
}

pub struct Entity {
    id: EntityId,
    name: String,
    transform: Transform,
    color: Vec4,
    visible: bool,

    geometry: Option<Geometry>,
    material: Option<MaterialHandle>,
    script: Option<ScriptHost>,
    context: RenderContext,
}

impl Entity {
    pub fn new(name: impl Into<String>, context: RenderContext) -> Self {
        Self {
            id: EntityId::default(),
            name: name.into(),
            transform: Transform::default(),
            color: Vec4::ONE,
            visible: true,
            geometry: None,
            material: None,
            script: None,
            context,
        }
    }

    pub(crate) fn with_id(mut self, id: EntityId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_initialized(&self) -> bool {
        self.geometry.is_some()
    }

    /// Uploads the fixed vertex data of `kind`. An entity gets its geometry
    /// once; later calls fail.
    pub fn initialize_primitive(&mut self, kind: PrimitiveKind) -> bool {
        if self.is_initialized() {
            log::warn!("Entity {} already has geometry", self.name);
            return false;
        }

        let label = format!("{} ({kind})", self.name);
        match GpuGeometry::create(&self.context, &label, &kind.geometry()) {
            Ok(buffers) => {
                self.geometry = Some(Geometry::Primitive { kind, buffers });
                true
            }
            Err(e) => {
                log::error!("Failed to create {kind} geometry for {}: {e:#}", self.name);
                false
            }
        }
    }

    pub fn initialize_rectangle(&mut self) -> bool {
        self.initialize_primitive(PrimitiveKind::Rectangle)
    }

    pub fn initialize_triangle(&mut self) -> bool {
        self.initialize_primitive(PrimitiveKind::Triangle)
    }

    pub fn initialize_model(&mut self, model: Model) -> bool {
        if self.is_initialized() {
            log::warn!("Entity {} already has geometry", self.name);
            return false;
        }
        self.geometry = Some(Geometry::Model(model));
        true
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match &self.geometry {
            Some(Geometry::Primitive { kind, .. }) => Some(*kind),
            _ => None,
        }
    }

    pub fn model(&self) -> Option<&Model> {
        match &self.geometry {
            Some(Geometry::Model(model)) => Some(model),
            _ => None,
        }
    }

    pub fn model_mut(&mut self) -> Option<&mut Model> {
        match &mut self.geometry {
            Some(Geometry::Model(model)) => Some(model),
            _ => None,
        }
    }

    pub fn set_material(&mut self, material: MaterialHandle) {
        self.material = Some(material);
    }

    pub fn material(&self) -> Option<&MaterialHandle> {
        self.material.as_ref()
    }

    /// Binds the script to this entity and runs its `init`.
    pub fn set_lua_script(&mut self, mut script: ScriptHost) {
        script.bind_to_object();
        script.call_init(ScriptTarget::Object(self));
        self.script = Some(script);
    }

    pub fn load_lua_script(&mut self, path: &Path, env: ScriptEnv) -> bool {
        let mut script = ScriptHost::new(env);
        if !script.load_from_file(path) {
            log::error!("Failed to load script {} for {}", path.display(), self.name);
            return false;
        }
        self.set_lua_script(script);
        true
    }

    pub fn script(&self) -> Option<&ScriptHost> {
        self.script.as_ref()
    }

    pub fn has_script(&self) -> bool {
        self.script.is_some()
    }

    pub fn update(&mut self, delta_time: f32) {
        if let Some(mut script) = self.script.take() {
            script.call_update(delta_time, ScriptTarget::Object(self));
            self.script = Some(script);
        }
    }

    /// Runs the script's render hook, then draws with the material. Does
    /// nothing without geometry, without a compiled material or while hidden.
    pub fn render(&mut self, time: f32) {
        if !self.is_initialized() || !self.visible {
            return;
        }
        let Some(material) = self.material.clone() else {
            return;
        };
        if !material.borrow().is_compiled() {
            return;
        }

        if let Some(mut script) = self.script.take() {
            script.call_render(ScriptTarget::Object(self));
            self.script = Some(script);
        }

        let mut material = material.borrow_mut();
        material.bind();
        material.set_uniform("time", time);
        material.set_uniform("objectColor", self.color);
        material.set_uniform("modelMatrix", self.model_matrix());

        for (geometry, range, texture) in self.draws() {
            self.context.draw(&DrawCall {
                geometry,
                range,
                uniforms: material.uniform_bytes(),
                texture,
            });
        }

        material.unbind();
    }

    fn draws(&self) -> Vec<(GeometryId, DrawRange, Option<TextureId>)> {
        match &self.geometry {
            Some(Geometry::Primitive { kind, buffers }) => {
                vec![(buffers.id(), kind.draw_range(), None)]
            }
            Some(Geometry::Model(model)) => model.draws().collect(),
            None => Vec::new(),
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        self.transform.local_matrix()
    }

    pub fn position(&self) -> Vec3 {
        self.transform.position()
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.transform.set_position(position);
    }

    pub fn rotation(&self) -> Vec3 {
        self.transform.rotation()
    }

    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.transform.set_rotation(rotation);
    }

    pub fn scale(&self) -> Vec3 {
        self.transform.scale()
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.transform.set_scale(scale);
    }

    pub fn color(&self) -> Vec4 {
        self.color
    }

    pub fn set_color(&mut self, color: Vec4) {
        self.color = color;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::rendering::{
        headless::{Command, HeadlessBackend},
        material::ShaderMaterial,
        shader_compiler::tests::{BROKEN_FRAGMENT, FRAGMENT, VERTEX},
    };

    fn setup() -> (Rc<HeadlessBackend>, RenderContext) {
        let backend = Rc::new(HeadlessBackend::new());
        let context: RenderContext = backend.clone();
        (backend, context)
    }

    fn compiled_material(context: &RenderContext) -> MaterialHandle {
        let mut material = ShaderMaterial::new("basic", context.clone());
        assert!(material.compile_from_source(VERTEX, FRAGMENT));
        material.into_handle()
    }

    #[test]
    fn primitive_is_set_once() {
        let (backend, context) = setup();
        let mut entity = Entity::new("shape", context);
        assert!(entity.initialize_triangle());
        assert!(!entity.initialize_rectangle());
        assert_eq!(entity.primitive_kind(), Some(PrimitiveKind::Triangle));
        assert_eq!(backend.live_geometry_count(), 1);

        drop(entity);
        assert_eq!(backend.live_geometry_count(), 0);
    }

    #[test]
    fn renders_triangle_and_rectangle_with_their_ranges() {
        let (backend, context) = setup();
        let material = compiled_material(&context);

        let mut triangle = Entity::new("triangle", context.clone());
        triangle.initialize_triangle();
        triangle.set_material(material.clone());
        let mut rectangle = Entity::new("rectangle", context.clone());
        rectangle.initialize_rectangle();
        rectangle.set_material(material);

        backend.take_commands();
        triangle.render(0.0);
        rectangle.render(0.0);

        let ranges: Vec<_> = backend.draws().iter().map(|draw| draw.range).collect();
        assert_eq!(ranges, vec![DrawRange::Vertices(3), DrawRange::Indexed(6)]);
        assert_eq!(backend.bound_program(), None);
    }

    #[test]
    fn skips_render_when_not_drawable() {
        let (backend, context) = setup();

        let mut no_material = Entity::new("a", context.clone());
        no_material.initialize_rectangle();
        no_material.render(0.0);

        let mut broken = ShaderMaterial::new("broken", context.clone());
        assert!(!broken.compile_from_source(VERTEX, BROKEN_FRAGMENT));
        let mut uncompiled = Entity::new("b", context.clone());
        uncompiled.initialize_rectangle();
        uncompiled.set_material(broken.into_handle());
        uncompiled.render(0.0);

        let mut hidden = Entity::new("c", context.clone());
        hidden.initialize_rectangle();
        hidden.set_material(compiled_material(&context));
        hidden.set_visible(false);

        let mut uninitialized = Entity::new("d", context.clone());
        uninitialized.set_material(compiled_material(&context));

        backend.take_commands();
        hidden.render(0.0);
        uninitialized.render(0.0);

        assert!(backend.draws().is_empty());
        assert!(!backend
            .commands()
            .iter()
            .any(|command| matches!(command, Command::BindProgram(_))));
    }

    #[test]
    fn render_pushes_color_and_model_matrix() {
        let (backend, context) = setup();
        let material = compiled_material(&context);

        let mut entity = Entity::new("quad", context);
        entity.initialize_rectangle();
        entity.set_material(material.clone());
        entity.set_color(Vec4::new(0.2, 0.4, 0.6, 1.0));
        entity.set_position(Vec3::new(1.0, 2.0, 3.0));
        entity.render(1.5);

        let material = material.borrow();
        let uniforms = material.uniforms();
        assert_eq!(
            uniforms.get("objectColor").unwrap(),
            bytemuck::bytes_of(&Vec4::new(0.2, 0.4, 0.6, 1.0))
        );
        assert_eq!(
            uniforms.get("modelMatrix").unwrap(),
            bytemuck::bytes_of(&entity.model_matrix())
        );
        let model: Vec<f32> = bytemuck::pod_collect_to_vec(uniforms.get("modelMatrix").unwrap());
        assert!(Mat4::from_cols_slice(&model)
            .abs_diff_eq(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)), 1e-6));
        assert_eq!(uniforms.get("time").unwrap(), bytemuck::bytes_of(&1.5f32));
        assert_eq!(backend.draws()[0].uniforms, material.uniform_bytes());
    }

    #[test]
    fn render_hook_runs_before_draw() {
        let (backend, context) = setup();
        let mut entity = Entity::new("quad", context.clone());
        entity.initialize_rectangle();
        entity.set_material(compiled_material(&context));

        let mut script = ScriptHost::new(ScriptEnv::default());
        assert!(script.load_from_string("function render() setColor(0, 1, 0, 1) end"));
        entity.set_lua_script(script);
        entity.render(0.0);

        let color = bytemuck::bytes_of(&Vec4::new(0.0, 1.0, 0.0, 1.0)).to_vec();
        let draw = &backend.draws()[0];
        // objectColor sits after the three matrices.
        assert_eq!(draw.uniforms[192..208], color[..]);
    }

    #[test]
    fn script_init_and_update_drive_the_entity() {
        let (_backend, context) = setup();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spin.lua");
        std::fs::write(
            &path,
            r#"
            function init() setRotation(0, 0, 1) end
            function update(dt) rotation.z = rotation.z + dt end
            "#,
        )
        .unwrap();

        let mut entity = Entity::new("spinner", context);
        assert!(entity.load_lua_script(&path, ScriptEnv::default()));
        assert_eq!(entity.rotation(), Vec3::new(0.0, 0.0, 1.0));

        entity.update(0.5);
        assert_eq!(entity.rotation(), Vec3::new(0.0, 0.0, 1.5));
        assert!(entity.has_script());
    }

    #[test]
    fn failed_script_load_keeps_entity_scriptless() {
        let (_backend, context) = setup();
        let mut entity = Entity::new("e", context);
        assert!(!entity.load_lua_script(Path::new("missing.lua"), ScriptEnv::default()));
        assert!(!entity.has_script());
    }
}
