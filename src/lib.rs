//! Script-driven scene graph runtime: a name-indexed registry of entities,
//! a camera, shader materials, and Lua scripts bound to each of them, with
//! scripts and shaders reloaded from disk while running.

pub mod camera;
pub mod config;
pub mod engine;
pub mod hot_reload;
pub mod input;
pub mod model;
pub mod rendering;
pub mod scene_graph;
pub mod scripting;
pub mod window;
