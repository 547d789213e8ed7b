pub mod backend;
pub mod headless;
pub mod material;
pub mod renderer;
pub mod shader_compiler;
pub mod texture;
pub mod uniforms;
pub mod wgpu_backend;
