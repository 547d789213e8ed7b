use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    num::NonZeroU64,
};

use anyhow::bail;
use image::RgbaImage;
use wgpu::util::DeviceExt;

use crate::rendering::{
    backend::{
        DrawCall, DrawRange, GeometryData, GeometryId, ProgramId, RenderBackend, TextureId,
        VertexLayout,
    },
    shader_compiler::{CompiledStage, LinkedProgram},
    texture::{DepthTexture, SampledTexture},
};

// Uniform slots are padded to this so that an empty block still binds.
const MIN_UNIFORM_SIZE: u64 = 16;

struct GeometryBuffers {
    vertices: wgpu::Buffer,
    indices: Option<wgpu::Buffer>,
    layout: VertexLayout,
}

struct ProgramEntry {
    label: String,
    vertex: wgpu::ShaderModule,
    vertex_entry: String,
    fragment: wgpu::ShaderModule,
    fragment_entry: String,
    uniform_size: u64,
}

struct PendingDraw {
    program: ProgramId,
    geometry: GeometryId,
    range: DrawRange,
    uniform_offset: u32,
    texture: Option<TextureId>,
}

#[derive(Default)]
struct State {
    geometries: HashMap<GeometryId, GeometryBuffers>,
    programs: HashMap<ProgramId, ProgramEntry>,
    pipelines: HashMap<(ProgramId, VertexLayout), wgpu::RenderPipeline>,
    textures: HashMap<TextureId, SampledTexture>,
    bound: Option<ProgramId>,

    pending: Vec<PendingDraw>,
    uniform_data: Vec<u8>,
}

/// Where a frame is drawn.
pub struct FrameTarget<'a> {
    pub color: &'a wgpu::TextureView,
    pub depth: &'a wgpu::TextureView,
    pub clear_color: wgpu::Color,
}

/// Draw calls are queued while the scene renders and replayed into a single
/// render pass by [`WgpuBackend::encode_frame`].
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    color_format: wgpu::TextureFormat,

    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    white_texture: SampledTexture,

    uniform_buffer: RefCell<wgpu::Buffer>,
    uniform_alignment: u64,

    state: RefCell<State>,
    next_id: Cell<u32>,
}

impl WgpuBackend {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        color_format: wgpu::TextureFormat,
    ) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material uniform bind group layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = SampledTexture::bind_group_layout(&device);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Material pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let sampler = SampledTexture::create_sampler(&device);
        let white_texture = SampledTexture::from_image(
            &device,
            &queue,
            &texture_layout,
            &sampler,
            &RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255])),
            "White texture",
        );

        let uniform_alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let uniform_buffer = Self::create_uniform_buffer(&device, 64 * 1024);

        Self {
            device,
            queue,
            color_format,
            uniform_layout,
            texture_layout,
            pipeline_layout,
            sampler,
            white_texture,
            uniform_buffer: RefCell::new(uniform_buffer),
            uniform_alignment,
            state: RefCell::new(State::default()),
            next_id: Cell::new(0),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn allocate(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    fn create_uniform_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Material uniforms"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn create_pipeline(
        &self,
        program: &ProgramEntry,
        layout: VertexLayout,
    ) -> anyhow::Result<wgpu::RenderPipeline> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(program.label.as_str()),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &program.vertex,
                    entry_point: Some(program.vertex_entry.as_str()),
                    buffers: &[layout.buffer_layout()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &program.fragment,
                    entry_point: Some(program.fragment_entry.as_str()),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.color_format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DepthTexture::DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            bail!(
                "Failed to create pipeline for {} ({layout:?}): {error}",
                program.label
            );
        }

        Ok(pipeline)
    }

    fn ensure_uniform_capacity(&self, size: u64) {
        let mut buffer = self.uniform_buffer.borrow_mut();
        if buffer.size() >= size {
            return;
        }
        let size = size.next_power_of_two();
        log::debug!("Growing uniform buffer to {size} bytes");
        *buffer = Self::create_uniform_buffer(&self.device, size);
    }

    /// Replays every draw queued since the last frame into one render pass
    /// that clears color and depth.
    pub fn encode_frame(&self, encoder: &mut wgpu::CommandEncoder, target: &FrameTarget<'_>) {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        let draws = std::mem::take(&mut state.pending);
        let uniform_data = std::mem::take(&mut state.uniform_data);

        self.ensure_uniform_capacity(uniform_data.len() as u64);
        let uniform_buffer = self.uniform_buffer.borrow();
        if !uniform_data.is_empty() {
            self.queue.write_buffer(&uniform_buffer, 0, &uniform_data);
        }

        let mut uniform_bind_groups: HashMap<ProgramId, wgpu::BindGroup> = HashMap::new();
        for draw in &draws {
            let Some(program) = state.programs.get(&draw.program) else {
                continue;
            };

            uniform_bind_groups.entry(draw.program).or_insert_with(|| {
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(program.label.as_str()),
                    layout: &self.uniform_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: &uniform_buffer,
                            offset: 0,
                            size: NonZeroU64::new(program.uniform_size),
                        }),
                    }],
                })
            });

            let Some(layout) = state.geometries.get(&draw.geometry).map(|g| g.layout) else {
                continue;
            };
            if state.pipelines.contains_key(&(draw.program, layout)) {
                continue;
            }
            match self.create_pipeline(program, layout) {
                Ok(pipeline) => {
                    state.pipelines.insert((draw.program, layout), pipeline);
                }
                Err(e) => log::error!("{e:#}"),
            }
        }

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(target.clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: target.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        for draw in &draws {
            let Some(geometry) = state.geometries.get(&draw.geometry) else {
                continue;
            };
            let (Some(pipeline), Some(uniforms)) = (
                state.pipelines.get(&(draw.program, geometry.layout)),
                uniform_bind_groups.get(&draw.program),
            ) else {
                continue;
            };
            let texture = draw
                .texture
                .and_then(|id| state.textures.get(&id))
                .unwrap_or(&self.white_texture);

            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, uniforms, &[draw.uniform_offset]);
            pass.set_bind_group(1, &texture.bind_group, &[]);
            pass.set_vertex_buffer(0, geometry.vertices.slice(..));

            match (draw.range, &geometry.indices) {
                (DrawRange::Vertices(count), _) => pass.draw(0..count, 0..1),
                (DrawRange::Indexed(count), Some(indices)) => {
                    pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..count, 0, 0..1);
                }
                (DrawRange::Indexed(_), None) => {
                    log::warn!("Indexed draw of {:?} without indices", draw.geometry);
                }
            }
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn create_geometry(&self, label: &str, data: &GeometryData<'_>) -> anyhow::Result<GeometryId> {
        let vertices = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data.vertex_bytes(),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let indices = data.indices().map(|indices| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice(indices),
                    usage: wgpu::BufferUsages::INDEX,
                })
        });

        let id = GeometryId(self.allocate());
        self.state.borrow_mut().geometries.insert(
            id,
            GeometryBuffers {
                vertices,
                indices,
                layout: data.layout(),
            },
        );
        Ok(id)
    }

    fn release_geometry(&self, id: GeometryId) {
        self.state.borrow_mut().geometries.remove(&id);
    }

    fn create_program(&self, label: &str, program: &LinkedProgram) -> anyhow::Result<ProgramId> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let create_module = |stage: &CompiledStage| {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(stage.label.as_str()),
                    source: wgpu::ShaderSource::Wgsl(stage.source.as_str().into()),
                })
        };
        let vertex = create_module(&program.vertex);
        let fragment = create_module(&program.fragment);

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            bail!("Failed to create shader modules for {label}: {error}");
        }

        let id = ProgramId(self.allocate());
        self.state.borrow_mut().programs.insert(
            id,
            ProgramEntry {
                label: label.to_string(),
                vertex,
                vertex_entry: program.vertex.entry_point.clone(),
                fragment,
                fragment_entry: program.fragment.entry_point.clone(),
                uniform_size: (program.uniforms.size() as u64).max(MIN_UNIFORM_SIZE),
            },
        );
        Ok(id)
    }

    fn release_program(&self, id: ProgramId) {
        let mut state = self.state.borrow_mut();
        state.programs.remove(&id);
        state.pipelines.retain(|(program, _), _| *program != id);
        if state.bound == Some(id) {
            state.bound = None;
        }
    }

    fn create_texture(&self, label: &str, image: &RgbaImage) -> anyhow::Result<TextureId> {
        let texture = SampledTexture::from_image(
            &self.device,
            &self.queue,
            &self.texture_layout,
            &self.sampler,
            image,
            label,
        );

        let id = TextureId(self.allocate());
        self.state.borrow_mut().textures.insert(id, texture);
        Ok(id)
    }

    fn release_texture(&self, id: TextureId) {
        self.state.borrow_mut().textures.remove(&id);
    }

    fn bind_program(&self, id: ProgramId) {
        self.state.borrow_mut().bound = Some(id);
    }

    fn unbind_program(&self) {
        self.state.borrow_mut().bound = None;
    }

    fn draw(&self, call: &DrawCall<'_>) {
        let mut state = self.state.borrow_mut();
        let Some(program) = state.bound else {
            log::warn!("Draw of geometry {:?} without a bound program", call.geometry);
            return;
        };
        let Some(uniform_size) = state.programs.get(&program).map(|p| p.uniform_size) else {
            return;
        };

        let offset = state.uniform_data.len().next_multiple_of(self.uniform_alignment as usize);
        state.uniform_data.resize(offset, 0);
        state.uniform_data.extend_from_slice(call.uniforms);
        state.uniform_data.resize(offset + uniform_size as usize, 0);

        state.pending.push(PendingDraw {
            program,
            geometry: call.geometry,
            range: call.range,
            uniform_offset: offset as u32,
            texture: call.texture,
        });
    }
}
