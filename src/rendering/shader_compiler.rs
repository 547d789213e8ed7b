use std::{collections::BTreeMap, path::Path};

use anyhow::{anyhow, bail, Context};
use naga::{
    valid::{Capabilities, ValidationFlags, Validator},
    AddressSpace, Binding, Module, Scalar, ScalarKind, ShaderStage, TypeInner, VectorSize,
};

use crate::rendering::uniforms::{UniformField, UniformKind, UniformLayout};

/// A single validated WGSL stage, reduced to what linking and pipeline
/// creation need.
#[derive(Debug, Clone)]
pub struct CompiledStage {
    pub label: String,
    pub source: String,
    pub entry_point: String,
    pub stage: ShaderStage,
    interface: BTreeMap<u32, TypeInner>,
    uniforms: Option<UniformLayout>,
    uses_texture: bool,
}

/// Vertex and fragment stages whose interfaces agree.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub vertex: CompiledStage,
    pub fragment: CompiledStage,
    pub uniforms: UniformLayout,
    pub uses_texture: bool,
}

pub fn compile_file(path: &Path, stage: ShaderStage) -> anyhow::Result<CompiledStage> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read shader file {}", path.display()))?;

    compile_source(&path.display().to_string(), source, stage)
}

pub fn compile_source(
    label: &str,
    source: String,
    stage: ShaderStage,
) -> anyhow::Result<CompiledStage> {
    let module = naga::front::wgsl::parse_str(&source)
        .map_err(|e| anyhow!("Failed to parse {label}:\n{}", e.emit_to_string(&source)))?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|e| anyhow!("Failed to validate {label}: {e}"))?;

    let entry = module
        .entry_points
        .iter()
        .find(|entry| entry.stage == stage)
        .ok_or_else(|| anyhow!("{label} has no {stage:?} entry point"))?;

    let mut interface = BTreeMap::new();
    match stage {
        ShaderStage::Vertex => {
            if let Some(result) = &entry.function.result {
                collect_locations(&module, result.ty, result.binding.as_ref(), &mut interface);
            }
        }
        ShaderStage::Fragment => {
            for argument in &entry.function.arguments {
                collect_locations(&module, argument.ty, argument.binding.as_ref(), &mut interface);
            }
        }
        ShaderStage::Compute => bail!("{label}: compute shaders cannot be used for materials"),
        // Task and mesh stages only exist in newer naga versions; keep the match open.
        #[allow(unreachable_patterns)]
        _ => bail!("{label}: unsupported shader stage {stage:?}"),
    }

    let (uniforms, uses_texture) = reflect_resources(label, &module)?;

    Ok(CompiledStage {
        label: label.to_string(),
        entry_point: entry.name.clone(),
        source,
        stage,
        interface,
        uniforms,
        uses_texture,
    })
}

pub fn link(vertex: CompiledStage, fragment: CompiledStage) -> anyhow::Result<LinkedProgram> {
    for (location, input) in &fragment.interface {
        match vertex.interface.get(location) {
            Some(output) if output == input => {}
            Some(output) => bail!(
                "@location({location}) is {output:?} in {} but {input:?} in {}",
                vertex.label,
                fragment.label
            ),
            None => bail!(
                "Fragment input @location({location}) in {} is not written by {}",
                fragment.label,
                vertex.label
            ),
        }
    }

    let uniforms = match (&vertex.uniforms, &fragment.uniforms) {
        (Some(v), Some(f)) if v != f => bail!(
            "Uniform blocks of {} and {} differ",
            vertex.label,
            fragment.label
        ),
        (Some(layout), _) | (None, Some(layout)) => layout.clone(),
        (None, None) => UniformLayout::default(),
    };

    let uses_texture = vertex.uses_texture || fragment.uses_texture;

    Ok(LinkedProgram {
        vertex,
        fragment,
        uniforms,
        uses_texture,
    })
}

fn collect_locations(
    module: &Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    out: &mut BTreeMap<u32, TypeInner>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            out.insert(*location, module.types[ty].inner.clone());
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

// Materials get one uniform block at group 0 and an optional texture/sampler
// pair at group 1. Anything else cannot be fed by the engine.
fn reflect_resources(
    label: &str,
    module: &Module,
) -> anyhow::Result<(Option<UniformLayout>, bool)> {
    let mut uniforms = None;
    let mut uses_texture = false;

    for (_, variable) in module.global_variables.iter() {
        let Some(binding) = &variable.binding else {
            continue;
        };

        let inner = &module.types[variable.ty].inner;
        match (binding.group, binding.binding) {
            (0, 0) if variable.space == AddressSpace::Uniform => {
                uniforms = Some(reflect_uniform_block(module, variable.name.as_deref(), inner));
            }
            (1, 0) if matches!(inner, TypeInner::Image { .. }) => uses_texture = true,
            (1, 1) if matches!(inner, TypeInner::Sampler { .. }) => uses_texture = true,
            (group, index) => bail!(
                "{label}: unsupported resource at @group({group}) @binding({index})"
            ),
        }
    }

    Ok((uniforms, uses_texture))
}

fn reflect_uniform_block(module: &Module, name: Option<&str>, inner: &TypeInner) -> UniformLayout {
    match inner {
        TypeInner::Struct { members, span } => {
            let mut layout = UniformLayout::new(span.next_multiple_of(16));
            for member in members {
                if let Some(name) = &member.name {
                    layout.insert(
                        name.clone(),
                        UniformField {
                            offset: member.offset,
                            kind: uniform_kind(&module.types[member.ty].inner),
                        },
                    );
                }
            }
            layout
        }
        // A bare `var<uniform> time: f32;` is addressed by the variable name.
        other => {
            let size = other.size(module.to_ctx());
            let mut layout = UniformLayout::new(size.next_multiple_of(16));
            if let Some(name) = name {
                layout.insert(
                    name,
                    UniformField {
                        offset: 0,
                        kind: uniform_kind(other),
                    },
                );
            }
            layout
        }
    }
}

fn uniform_kind(inner: &TypeInner) -> UniformKind {
    match *inner {
        TypeInner::Scalar(Scalar {
            kind: ScalarKind::Float,
            width: 4,
        }) => UniformKind::Float,
        TypeInner::Scalar(Scalar {
            kind: ScalarKind::Sint,
            width: 4,
        }) => UniformKind::Int,
        TypeInner::Vector { size, scalar } if scalar == Scalar::F32 => match size {
            VectorSize::Tri => UniformKind::Vec3,
            VectorSize::Quad => UniformKind::Vec4,
            _ => UniformKind::Other,
        },
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            scalar,
        } if scalar == Scalar::F32 => UniformKind::Mat4,
        _ => UniformKind::Other,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const VERTEX: &str = r#"
struct Uniforms {
    modelMatrix: mat4x4<f32>,
    viewMatrix: mat4x4<f32>,
    projectionMatrix: mat4x4<f32>,
    objectColor: vec4<f32>,
    time: f32,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) color: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = u.projectionMatrix * u.viewMatrix * u.modelMatrix * vec4<f32>(position, 1.0);
    out.color = color;
    return out;
}
"#;

    pub const FRAGMENT: &str = r#"
struct Uniforms {
    modelMatrix: mat4x4<f32>,
    viewMatrix: mat4x4<f32>,
    projectionMatrix: mat4x4<f32>,
    objectColor: vec4<f32>,
    time: f32,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

@fragment
fn fs_main(@location(0) color: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(color, 1.0) * u.objectColor;
}
"#;

    pub const BROKEN_FRAGMENT: &str = r#"
@fragment
fn fs_main( -> @location(0) vec4<f32> {
    return vec4<f32>(1.0);
"#;

    fn stage(source: &str, stage: ShaderStage) -> anyhow::Result<CompiledStage> {
        compile_source("test", source.to_string(), stage)
    }

    #[test]
    fn reflects_uniform_offsets() {
        let program = link(
            stage(VERTEX, ShaderStage::Vertex).unwrap(),
            stage(FRAGMENT, ShaderStage::Fragment).unwrap(),
        )
        .unwrap();

        let view = program.uniforms.get("viewMatrix").unwrap();
        assert_eq!(view.offset, 64);
        assert_eq!(view.kind, UniformKind::Mat4);
        let color = program.uniforms.get("objectColor").unwrap();
        assert_eq!(color.offset, 192);
        assert_eq!(color.kind, UniformKind::Vec4);
        assert_eq!(program.uniforms.get("time").unwrap().offset, 208);
        assert_eq!(program.uniforms.size(), 224);
        assert!(!program.uses_texture);
        assert_eq!(program.vertex.entry_point, "vs_main");
        assert_eq!(program.fragment.entry_point, "fs_main");
    }

    #[test]
    fn syntax_errors_fail_compilation() {
        assert!(stage(BROKEN_FRAGMENT, ShaderStage::Fragment).is_err());
    }

    #[test]
    fn missing_entry_point_fails() {
        assert!(stage(VERTEX, ShaderStage::Fragment).is_err());
    }

    #[test]
    fn unmatched_fragment_input_fails_to_link() {
        let fragment = r#"
@fragment
fn fs_main(@location(3) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(uv, 0.0, 1.0);
}
"#;
        let result = link(
            stage(VERTEX, ShaderStage::Vertex).unwrap(),
            stage(fragment, ShaderStage::Fragment).unwrap(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn mismatched_input_type_fails_to_link() {
        let fragment = r#"
@fragment
fn fs_main(@location(0) color: vec4<f32>) -> @location(0) vec4<f32> {
    return color;
}
"#;
        let result = link(
            stage(VERTEX, ShaderStage::Vertex).unwrap(),
            stage(fragment, ShaderStage::Fragment).unwrap(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn unsupported_bindings_are_rejected() {
        let fragment = r#"
@group(2) @binding(0) var<uniform> extra: vec4<f32>;

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return extra;
}
"#;
        assert!(stage(fragment, ShaderStage::Fragment).is_err());
    }
}
