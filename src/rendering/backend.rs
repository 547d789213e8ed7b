use std::{
    mem::offset_of,
    rc::{Rc, Weak},
};

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use image::RgbaImage;

use crate::rendering::shader_compiler::LinkedProgram;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Vertex of the built-in primitives.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    pub position: Vec3,
    pub color: Vec3,
}

/// Vertex of imported meshes.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coords: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    Colored,
    Mesh,
}

impl VertexLayout {
    pub fn buffer_layout(self) -> wgpu::VertexBufferLayout<'static> {
        match self {
            VertexLayout::Colored => COLOR_VERTEX_LAYOUT,
            VertexLayout::Mesh => MESH_VERTEX_LAYOUT,
        }
    }
}

const COLOR_VERTEX_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<ColorVertex>() as wgpu::BufferAddress,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[
        wgpu::VertexAttribute {
            offset: offset_of!(ColorVertex, position) as wgpu::BufferAddress,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: offset_of!(ColorVertex, color) as wgpu::BufferAddress,
            shader_location: 1,
            format: wgpu::VertexFormat::Float32x3,
        },
    ],
};

const MESH_VERTEX_LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
    array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
    step_mode: wgpu::VertexStepMode::Vertex,
    attributes: &[
        wgpu::VertexAttribute {
            offset: offset_of!(MeshVertex, position) as wgpu::BufferAddress,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: offset_of!(MeshVertex, normal) as wgpu::BufferAddress,
            shader_location: 1,
            format: wgpu::VertexFormat::Float32x3,
        },
        wgpu::VertexAttribute {
            offset: offset_of!(MeshVertex, tex_coords) as wgpu::BufferAddress,
            shader_location: 2,
            format: wgpu::VertexFormat::Float32x2,
        },
    ],
};

pub enum GeometryData<'a> {
    Colored {
        vertices: &'a [ColorVertex],
        indices: Option<&'a [u32]>,
    },
    Mesh {
        vertices: &'a [MeshVertex],
        indices: &'a [u32],
    },
}

impl GeometryData<'_> {
    pub fn layout(&self) -> VertexLayout {
        match self {
            GeometryData::Colored { .. } => VertexLayout::Colored,
            GeometryData::Mesh { .. } => VertexLayout::Mesh,
        }
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        match self {
            GeometryData::Colored { vertices, .. } => bytemuck::cast_slice(vertices),
            GeometryData::Mesh { vertices, .. } => bytemuck::cast_slice(vertices),
        }
    }

    pub fn indices(&self) -> Option<&[u32]> {
        match self {
            GeometryData::Colored { indices, .. } => *indices,
            GeometryData::Mesh { indices, .. } => Some(indices),
        }
    }

    pub fn vertex_count(&self) -> usize {
        match self {
            GeometryData::Colored { vertices, .. } => vertices.len(),
            GeometryData::Mesh { vertices, .. } => vertices.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawRange {
    Vertices(u32),
    Indexed(u32),
}

pub struct DrawCall<'a> {
    pub geometry: GeometryId,
    pub range: DrawRange,
    /// Snapshot of the bound material's uniform block.
    pub uniforms: &'a [u8],
    pub texture: Option<TextureId>,
}

/// The graphics API as seen by materials and entities. Methods take `&self`
/// so one backend can be shared by every resource owner.
pub trait RenderBackend {
    fn create_geometry(&self, label: &str, data: &GeometryData<'_>) -> anyhow::Result<GeometryId>;
    fn release_geometry(&self, id: GeometryId);

    fn create_program(&self, label: &str, program: &LinkedProgram) -> anyhow::Result<ProgramId>;
    fn release_program(&self, id: ProgramId);

    fn create_texture(&self, label: &str, image: &RgbaImage) -> anyhow::Result<TextureId>;
    fn release_texture(&self, id: TextureId);

    fn bind_program(&self, id: ProgramId);
    fn unbind_program(&self);

    /// Draws with the currently bound program.
    fn draw(&self, call: &DrawCall<'_>);
}

pub type RenderContext = Rc<dyn RenderBackend>;

/// Vertex and index buffers, released when dropped.
pub struct GpuGeometry {
    id: GeometryId,
    layout: VertexLayout,
    backend: Weak<dyn RenderBackend>,
}

impl GpuGeometry {
    pub fn create(
        context: &RenderContext,
        label: &str,
        data: &GeometryData<'_>,
    ) -> anyhow::Result<Self> {
        let id = context.create_geometry(label, data)?;
        Ok(Self {
            id,
            layout: data.layout(),
            backend: Rc::downgrade(context),
        })
    }

    pub fn id(&self) -> GeometryId {
        self.id
    }

    pub fn layout(&self) -> VertexLayout {
        self.layout
    }
}

impl Drop for GpuGeometry {
    fn drop(&mut self) {
        if let Some(backend) = self.backend.upgrade() {
            backend.release_geometry(self.id);
        }
    }
}

/// A linked program, released when dropped.
pub struct GpuProgram {
    id: ProgramId,
    backend: Weak<dyn RenderBackend>,
}

impl GpuProgram {
    pub fn create(
        context: &RenderContext,
        label: &str,
        program: &LinkedProgram,
    ) -> anyhow::Result<Self> {
        let id = context.create_program(label, program)?;
        Ok(Self {
            id,
            backend: Rc::downgrade(context),
        })
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }
}

impl Drop for GpuProgram {
    fn drop(&mut self) {
        if let Some(backend) = self.backend.upgrade() {
            backend.release_program(self.id);
        }
    }
}

pub struct GpuTexture {
    id: TextureId,
    backend: Weak<dyn RenderBackend>,
}

impl GpuTexture {
    pub fn create(context: &RenderContext, label: &str, image: &RgbaImage) -> anyhow::Result<Self> {
        let id = context.create_texture(label, image)?;
        Ok(Self {
            id,
            backend: Rc::downgrade(context),
        })
    }

    pub fn id(&self) -> TextureId {
        self.id
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        if let Some(backend) = self.backend.upgrade() {
            backend.release_texture(self.id);
        }
    }
}
