use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
};

use image::RgbaImage;

use crate::rendering::{
    backend::{
        DrawCall, DrawRange, GeometryData, GeometryId, ProgramId, RenderBackend, TextureId,
        VertexLayout,
    },
    shader_compiler::LinkedProgram,
};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub program: ProgramId,
    pub geometry: GeometryId,
    pub range: DrawRange,
    pub uniforms: Vec<u8>,
    pub texture: Option<TextureId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateGeometry(GeometryId),
    ReleaseGeometry(GeometryId),
    CreateProgram(ProgramId),
    ReleaseProgram(ProgramId),
    CreateTexture(TextureId),
    ReleaseTexture(TextureId),
    BindProgram(ProgramId),
    UnbindProgram,
    Draw(RecordedDraw),
}

#[derive(Debug, Clone)]
pub struct GeometryInfo {
    pub label: String,
    pub layout: VertexLayout,
    pub vertex_count: usize,
    pub index_count: Option<usize>,
}

#[derive(Default)]
struct State {
    geometries: BTreeMap<GeometryId, GeometryInfo>,
    programs: BTreeMap<ProgramId, String>,
    textures: BTreeMap<TextureId, (u32, u32)>,
    bound: Option<ProgramId>,
    commands: Vec<Command>,
}

/// Backend that keeps resources as bookkeeping only and records every
/// command. Used for tests and for running scenes without a window.
#[derive(Default)]
pub struct HeadlessBackend {
    state: RefCell<State>,
    next_id: Cell<u32>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.borrow().commands.clone()
    }

    pub fn take_commands(&self) -> Vec<Command> {
        std::mem::take(&mut self.state.borrow_mut().commands)
    }

    pub fn draws(&self) -> Vec<RecordedDraw> {
        self.state
            .borrow()
            .commands
            .iter()
            .filter_map(|command| match command {
                Command::Draw(draw) => Some(draw.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn bound_program(&self) -> Option<ProgramId> {
        self.state.borrow().bound
    }

    pub fn live_geometry_count(&self) -> usize {
        self.state.borrow().geometries.len()
    }

    pub fn live_program_count(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn live_texture_count(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn program_creations(&self) -> usize {
        self.state
            .borrow()
            .commands
            .iter()
            .filter(|command| matches!(command, Command::CreateProgram(_)))
            .count()
    }

    pub fn geometry(&self, id: GeometryId) -> Option<GeometryInfo> {
        self.state.borrow().geometries.get(&id).cloned()
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_geometry(&self, label: &str, data: &GeometryData<'_>) -> anyhow::Result<GeometryId> {
        let id = GeometryId(self.allocate());
        let mut state = self.state.borrow_mut();
        state.geometries.insert(
            id,
            GeometryInfo {
                label: label.to_string(),
                layout: data.layout(),
                vertex_count: data.vertex_count(),
                index_count: data.indices().map(<[u32]>::len),
            },
        );
        state.commands.push(Command::CreateGeometry(id));
        Ok(id)
    }

    fn release_geometry(&self, id: GeometryId) {
        let mut state = self.state.borrow_mut();
        state.geometries.remove(&id);
        state.commands.push(Command::ReleaseGeometry(id));
    }

    fn create_program(&self, label: &str, _program: &LinkedProgram) -> anyhow::Result<ProgramId> {
        let id = ProgramId(self.allocate());
        let mut state = self.state.borrow_mut();
        state.programs.insert(id, label.to_string());
        state.commands.push(Command::CreateProgram(id));
        Ok(id)
    }

    fn release_program(&self, id: ProgramId) {
        let mut state = self.state.borrow_mut();
        state.programs.remove(&id);
        if state.bound == Some(id) {
            state.bound = None;
        }
        state.commands.push(Command::ReleaseProgram(id));
    }

    fn create_texture(&self, _label: &str, image: &RgbaImage) -> anyhow::Result<TextureId> {
        let id = TextureId(self.allocate());
        let mut state = self.state.borrow_mut();
        state.textures.insert(id, image.dimensions());
        state.commands.push(Command::CreateTexture(id));
        Ok(id)
    }

    fn release_texture(&self, id: TextureId) {
        let mut state = self.state.borrow_mut();
        state.textures.remove(&id);
        state.commands.push(Command::ReleaseTexture(id));
    }

    fn bind_program(&self, id: ProgramId) {
        let mut state = self.state.borrow_mut();
        state.bound = Some(id);
        state.commands.push(Command::BindProgram(id));
    }

    fn unbind_program(&self) {
        let mut state = self.state.borrow_mut();
        state.bound = None;
        state.commands.push(Command::UnbindProgram);
    }

    fn draw(&self, call: &DrawCall<'_>) {
        let mut state = self.state.borrow_mut();
        let Some(program) = state.bound else {
            log::warn!("Draw of geometry {:?} without a bound program", call.geometry);
            return;
        };

        state.commands.push(Command::Draw(RecordedDraw {
            program,
            geometry: call.geometry,
            range: call.range,
            uniforms: call.uniforms.to_vec(),
            texture: call.texture,
        }));
    }
}
