use std::{collections::HashMap, ops::Range, path::Path};

use anyhow::{anyhow, Context};
use glam::{Vec2, Vec3};
use itertools::izip;

use crate::rendering::backend::{
    DrawRange, GeometryData, GeometryId, GpuGeometry, GpuTexture, MeshVertex, RenderContext,
    TextureId,
};

/// Triangle mesh handed over by an importer: one shared vertex list and an
/// index list split into ranges per material.
#[derive(Debug, Clone, Default)]
pub struct MeshImport {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    pub partitions: Vec<MeshPartition>,
}

#[derive(Debug, Clone)]
pub struct MeshPartition {
    pub material_name: String,
    pub indices: Range<usize>,
}

impl MeshImport {
    pub fn from_gltf(path: &Path) -> anyhow::Result<MeshImport> {
        let (document, buffers, _images) = gltf::import(path)
            .with_context(|| format!("Failed to import {}", path.display()))?;

        let mut vertices = Vec::new();
        // Keyed by material name, in order of first appearance.
        let mut groups: Vec<(String, Vec<u32>)> = Vec::new();

        for mesh in document.meshes() {
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    return Err(anyhow!(
                        "Unsupported primitive mode in {}: {:?}",
                        path.display(),
                        primitive.mode()
                    ));
                }

                let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));

                let positions: Vec<[f32; 3]> = reader
                    .read_positions()
                    .ok_or_else(|| anyhow!("Primitive without positions in {}", path.display()))?
                    .collect();
                let count = positions.len();
                let normals: Vec<[f32; 3]> = reader
                    .read_normals()
                    .map(|normals| normals.collect())
                    .unwrap_or_else(|| vec![[0.0; 3]; count]);
                let tex_coords: Vec<[f32; 2]> = reader
                    .read_tex_coords(0)
                    .map(|tex_coords| tex_coords.into_f32().collect())
                    .unwrap_or_else(|| vec![[0.0; 2]; count]);

                let base = vertices.len() as u32;
                vertices.extend(izip!(positions, normals, tex_coords).map(
                    |(position, normal, tex_coords)| MeshVertex {
                        position: Vec3::from(position),
                        normal: Vec3::from(normal),
                        tex_coords: Vec2::from(tex_coords),
                    },
                ));

                let indices: Vec<u32> = match reader.read_indices() {
                    Some(indices) => indices.into_u32().map(|index| index + base).collect(),
                    None => (base..base + count as u32).collect(),
                };

                let material_name = primitive.material().name().unwrap_or("default").to_string();
                match groups.iter_mut().find(|(name, _)| *name == material_name) {
                    Some((_, group)) => group.extend(indices),
                    None => groups.push((material_name, indices)),
                }
            }
        }

        let mut import = MeshImport {
            vertices,
            ..Default::default()
        };
        for (material_name, indices) in groups {
            let start = import.indices.len();
            import.indices.extend(indices);
            import.partitions.push(MeshPartition {
                material_name,
                indices: start..import.indices.len(),
            });
        }

        if import.indices.is_empty() {
            return Err(anyhow!("No triangles in {}", path.display()));
        }

        Ok(import)
    }

    fn partitions_or_whole(&self) -> Vec<MeshPartition> {
        if self.partitions.is_empty() {
            vec![MeshPartition {
                material_name: String::new(),
                indices: 0..self.indices.len(),
            }]
        } else {
            self.partitions.clone()
        }
    }

    fn compact(&self, partition: &MeshPartition) -> anyhow::Result<(Vec<MeshVertex>, Vec<u32>)> {
        let source = self
            .indices
            .get(partition.indices.clone())
            .ok_or_else(|| anyhow!("Partition {} is out of range", partition.material_name))?;

        let mut remap = HashMap::new();
        let mut vertices = Vec::new();
        let mut indices = Vec::with_capacity(source.len());

        for &index in source {
            let vertex = *self
                .vertices
                .get(index as usize)
                .ok_or_else(|| anyhow!("Index {index} is out of range"))?;
            let compacted = *remap.entry(index).or_insert_with(|| {
                vertices.push(vertex);
                vertices.len() as u32 - 1
            });
            indices.push(compacted);
        }

        Ok((vertices, indices))
    }
}

struct ModelMesh {
    material_name: String,
    geometry: GpuGeometry,
    index_count: u32,
    texture: Option<GpuTexture>,
}

pub struct Model {
    name: String,
    meshes: Vec<ModelMesh>,
    context: RenderContext,
}

impl Model {
    pub fn load(context: &RenderContext, path: &Path) -> anyhow::Result<Model> {
        let import = MeshImport::from_gltf(path)?;
        Self::from_import(context, path.display().to_string(), &import)
    }

    pub fn from_import(
        context: &RenderContext,
        name: impl Into<String>,
        import: &MeshImport,
    ) -> anyhow::Result<Model> {
        let name = name.into();
        let mut meshes = Vec::new();

        for (index, partition) in import.partitions_or_whole().iter().enumerate() {
            let (vertices, indices) = import.compact(partition)?;
            let label = format!("{name} (mesh {index}, {})", partition.material_name);
            let geometry = GpuGeometry::create(
                context,
                &label,
                &GeometryData::Mesh {
                    vertices: &vertices,
                    indices: &indices,
                },
            )?;

            meshes.push(ModelMesh {
                material_name: partition.material_name.clone(),
                geometry,
                index_count: indices.len() as u32,
                texture: None,
            });
        }

        log::info!("Loaded model {name} with {} meshes", meshes.len());

        Ok(Model {
            name,
            meshes,
            context: context.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Material name of mesh `index`, or an empty string if there is none.
    pub fn material_name(&self, index: usize) -> &str {
        self.meshes
            .get(index)
            .map_or("", |mesh| mesh.material_name.as_str())
    }

    pub fn load_texture_for_mesh(&mut self, index: usize, path: &Path, flip_v: bool) -> bool {
        let Some(mesh) = self.meshes.get_mut(index) else {
            log::warn!("Model {} has no mesh {index}", self.name);
            return false;
        };

        match load_texture(&self.context, path, flip_v) {
            Ok(texture) => {
                mesh.texture = Some(texture);
                true
            }
            Err(e) => {
                log::error!("{e:#}");
                false
            }
        }
    }

    pub fn draws(&self) -> impl Iterator<Item = (GeometryId, DrawRange, Option<TextureId>)> + '_ {
        self.meshes.iter().map(|mesh| {
            (
                mesh.geometry.id(),
                DrawRange::Indexed(mesh.index_count),
                mesh.texture.as_ref().map(GpuTexture::id),
            )
        })
    }
}

fn load_texture(context: &RenderContext, path: &Path, flip_v: bool) -> anyhow::Result<GpuTexture> {
    let image = image::open(path)
        .with_context(|| format!("Failed to load texture {}", path.display()))?;
    let image = if flip_v { image.flipv() } else { image };

    GpuTexture::create(context, &path.display().to_string(), &image.to_rgba8())
}
