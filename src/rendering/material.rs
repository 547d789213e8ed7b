use std::{cell::RefCell, path::Path, rc::Rc};

use anyhow::Context;
use naga::ShaderStage;

use crate::{
    hot_reload::WatchedFile,
    rendering::{
        backend::{GpuProgram, RenderContext},
        shader_compiler::{self, CompiledStage},
        uniforms::{UniformBlock, UniformValue},
    },
};

/// Materials are shared between entities.
pub type MaterialHandle = Rc<RefCell<ShaderMaterial>>;

pub struct ShaderMaterial {
    name: String,
    context: RenderContext,
    program: Option<GpuProgram>,
    uniforms: UniformBlock,
    uses_texture: bool,
    sources: Option<(WatchedFile, WatchedFile)>,
    hot_reload: bool,
}

impl ShaderMaterial {
    pub fn new(name: impl Into<String>, context: RenderContext) -> Self {
        Self {
            name: name.into(),
            context,
            program: None,
            uniforms: UniformBlock::default(),
            uses_texture: false,
            sources: None,
            hot_reload: false,
        }
    }

    pub fn into_handle(self) -> MaterialHandle {
        Rc::new(RefCell::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_compiled(&self) -> bool {
        self.program.is_some()
    }

    pub fn uses_texture(&self) -> bool {
        self.uses_texture
    }

    pub fn vertex_path(&self) -> Option<&Path> {
        self.sources.as_ref().map(|(vertex, _)| vertex.path())
    }

    pub fn fragment_path(&self) -> Option<&Path> {
        self.sources
            .as_ref()
            .map(|(_, fragment)| fragment.path())
    }

    /// Compiles and links a program from two WGSL files. The paths are kept
    /// for hot reloading even when compilation fails.
    pub fn compile_from_files(&mut self, vertex_path: &Path, fragment_path: &Path) -> bool {
        self.sources = Some((WatchedFile::new(vertex_path), WatchedFile::new(fragment_path)));

        let result = shader_compiler::compile_file(vertex_path, ShaderStage::Vertex).and_then(
            |vertex| {
                let fragment = shader_compiler::compile_file(fragment_path, ShaderStage::Fragment)?;
                self.build(vertex, fragment)
            },
        );
        self.finish_compile(result)
    }

    pub fn compile_from_source(&mut self, vertex_source: &str, fragment_source: &str) -> bool {
        let label = self.name.clone();
        let result = shader_compiler::compile_source(
            &format!("{label} (vertex)"),
            vertex_source.to_string(),
            ShaderStage::Vertex,
        )
        .and_then(|vertex| {
            let fragment = shader_compiler::compile_source(
                &format!("{label} (fragment)"),
                fragment_source.to_string(),
                ShaderStage::Fragment,
            )?;
            self.build(vertex, fragment)
        });
        self.finish_compile(result)
    }

    fn build(
        &self,
        vertex: CompiledStage,
        fragment: CompiledStage,
    ) -> anyhow::Result<(GpuProgram, UniformBlock, bool)> {
        let program = shader_compiler::link(vertex, fragment)
            .with_context(|| format!("Failed to link material {}", self.name))?;
        let gpu_program = GpuProgram::create(&self.context, &self.name, &program)?;

        Ok((
            gpu_program,
            UniformBlock::new(program.uniforms),
            program.uses_texture,
        ))
    }

    // A failed compile leaves a previously compiled program in place.
    fn finish_compile(&mut self, result: anyhow::Result<(GpuProgram, UniformBlock, bool)>) -> bool {
        match result {
            Ok((program, uniforms, uses_texture)) => {
                self.program = Some(program);
                self.uniforms = uniforms;
                self.uses_texture = uses_texture;
                log::info!("Compiled shader material {}", self.name);
                true
            }
            Err(e) => {
                log::error!("Shader material {} failed to compile: {e:#}", self.name);
                false
            }
        }
    }

    pub fn enable_hot_reload(&mut self, enabled: bool) {
        self.hot_reload = enabled;
    }

    /// Recompiles the program if either source file changed on disk since the
    /// last check. Returns true when a new program was swapped in.
    pub fn check_and_reload(&mut self) -> bool {
        if !self.hot_reload {
            return false;
        }

        let Some((vertex, fragment)) = self.sources.as_mut() else {
            return false;
        };

        // Poll both so neither timestamp goes stale.
        let vertex_changed = vertex.poll();
        let fragment_changed = fragment.poll();
        if !vertex_changed && !fragment_changed {
            return false;
        }

        let vertex_path = vertex.path().to_path_buf();
        let fragment_path = fragment.path().to_path_buf();
        log::info!("Reloading shader material {}", self.name);

        let result = shader_compiler::compile_file(&vertex_path, ShaderStage::Vertex).and_then(
            |vertex| {
                let fragment =
                    shader_compiler::compile_file(&fragment_path, ShaderStage::Fragment)?;
                self.build(vertex, fragment)
            },
        );
        self.finish_compile(result)
    }

    pub fn bind(&self) {
        if let Some(program) = &self.program {
            self.context.bind_program(program.id());
        }
    }

    pub fn unbind(&self) {
        if self.program.is_some() {
            self.context.unbind_program();
        }
    }

    /// Writes a uniform by member name. Unknown names are ignored.
    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) {
        if self.program.is_none() {
            return;
        }
        self.uniforms.set(name, value.into());
    }

    pub fn uniform_bytes(&self) -> &[u8] {
        self.uniforms.bytes()
    }

    pub fn uniforms(&self) -> &UniformBlock {
        &self.uniforms
    }
}
