//! Functions visible to scripts.
//!
//! Utility and input functions are registered once per Lua state. Functions
//! acting on a target (entity, camera or scene) are registered for the
//! duration of a single call through [`mlua::Lua::scope`], capturing only the
//! [`HostContext`] of that call. Outside of a call, stubs that do nothing
//! stand in for them.

use std::{cell::RefCell, path::Path};

use glam::{Mat4, Vec3, Vec4};
use itertools::Itertools;
use mlua::{FromLuaMulti, Function, IntoLuaMulti, Lua, MultiValue, Scope, Table, Value, Variadic};

use crate::{
    camera::Camera,
    input::codes,
    rendering::uniforms::UniformValue,
    scene_graph::{entity::Entity, registry::SceneRegistry},
    scripting::{
        env::ScriptEnv,
        host::{ScriptBinding, ScriptTarget},
    },
};

pub const ENTITY_FUNCTIONS: &[&str] = &[
    "setPosition",
    "getPosition",
    "setRotation",
    "getRotation",
    "setScale",
    "getScale",
    "setColor",
    "getColor",
    "setVisible",
    "isVisible",
    "setUniform",
];

pub const CAMERA_FUNCTIONS: &[&str] = &[
    "setCameraPosition",
    "getCameraPosition",
    "setCameraTarget",
    "getCameraTarget",
    "setCameraUp",
    "getCameraUp",
    "lookAt",
    "setPerspective",
    "setFOV",
    "getFOV",
    "setAspectRatio",
    "setNearFar",
    "moveForward",
    "moveBackward",
    "moveLeft",
    "moveRight",
    "moveUp",
    "moveDown",
    "rotateYaw",
    "rotatePitch",
    "rotateRoll",
];

pub const SCENE_FUNCTIONS: &[&str] = &[
    "createObject",
    "createShader",
    "createModel",
    "attachShaderToObject",
    "attachScriptToObject",
    "getObjectByName",
    "removeObject",
    "listObjects",
    "reloadScript",
    "clearScene",
    "setObjectPosition",
    "getObjectPosition",
    "setObjectRotation",
    "getObjectRotation",
    "setObjectScale",
    "getObjectScale",
    "setObjectColor",
    "getObjectColor",
    "setObjectVisible",
    "isObjectVisible",
    "getMeshCount",
    "getMaterialName",
    "loadTextureForMesh",
];

/// The target of a single script call, shared by the functions registered
/// for that call.
pub(crate) struct HostContext<'t> {
    target: RefCell<ScriptTarget<'t>>,
}

impl<'t> HostContext<'t> {
    pub fn new(target: ScriptTarget<'t>) -> Self {
        Self {
            target: RefCell::new(target),
        }
    }

    fn with_target<R>(&self, f: impl FnOnce(&mut ScriptTarget<'t>) -> R) -> Option<R> {
        match self.target.try_borrow_mut() {
            Ok(mut target) => Some(f(&mut target)),
            Err(_) => {
                log::error!("Script re-entered its own host function");
                None
            }
        }
    }

    fn with_object<R>(&self, f: impl FnOnce(&mut Entity) -> R) -> Option<R> {
        self.with_target(|target| match target {
            ScriptTarget::Object(entity) => Some(f(entity)),
            _ => None,
        })
        .flatten()
    }

    fn with_camera<R>(&self, f: impl FnOnce(&mut Camera) -> R) -> Option<R> {
        self.with_target(|target| match target {
            ScriptTarget::Camera(camera) => Some(f(camera)),
            _ => None,
        })
        .flatten()
    }

    fn with_scene<R>(&self, f: impl FnOnce(&mut SceneRegistry) -> R) -> Option<R> {
        self.with_target(|target| match target {
            ScriptTarget::Scene(registry) => Some(f(registry)),
            _ => None,
        })
        .flatten()
    }
}

pub(crate) fn create_context(env: &ScriptEnv) -> mlua::Result<Lua> {
    let lua = Lua::new();
    let globals = lua.globals();

    register_utility(&lua, &globals, env)?;
    register_input(&lua, &globals, env)?;
    register_stubs(&lua, &globals)?;

    Ok(lua)
}

fn register_utility(lua: &Lua, globals: &Table, env: &ScriptEnv) -> mlua::Result<()> {
    let clock = env.clock;
    globals.set(
        "getTime",
        lua.create_function(move |_, ()| Ok(clock.elapsed_secs()))?,
    )?;
    globals.set("sin", lua.create_function(|_, x: f64| Ok(x.sin()))?)?;
    globals.set("cos", lua.create_function(|_, x: f64| Ok(x.cos()))?)?;
    globals.set(
        "print",
        lua.create_function(|_, args: Variadic<Value>| {
            let line = args.iter().map(describe).join("\t");
            log::info!(target: "script", "{line}");
            Ok(())
        })?,
    )?;

    Ok(())
}

fn describe(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.to_string_lossy(),
        other => other.type_name().to_string(),
    }
}

fn register_input(lua: &Lua, globals: &Table, env: &ScriptEnv) -> mlua::Result<()> {
    let input = env.input.clone();
    globals.set(
        "isKeyPressed",
        lua.create_function(move |_, code: i32| {
            Ok(input.as_ref().is_some_and(|input| input.is_key_pressed(code)))
        })?,
    )?;

    let input = env.input.clone();
    globals.set(
        "isMouseButtonPressed",
        lua.create_function(move |_, code: i32| {
            Ok(input
                .as_ref()
                .is_some_and(|input| input.is_mouse_button_pressed(code)))
        })?,
    )?;

    let input = env.input.clone();
    globals.set(
        "getMousePosition",
        lua.create_function(move |_, ()| {
            let position = input
                .as_ref()
                .map(|input| input.mouse_position())
                .unwrap_or_default();
            Ok((position.x, position.y))
        })?,
    )?;

    let input = env.input.clone();
    globals.set(
        "getMouseDelta",
        lua.create_function(move |_, ()| {
            let delta = input
                .as_ref()
                .map(|input| input.mouse_delta())
                .unwrap_or_default();
            Ok((delta.x, delta.y))
        })?,
    )?;

    for &(name, code) in codes::NAMED {
        globals.set(name, lua.create_function(move |_, ()| Ok(code))?)?;
    }

    Ok(())
}

fn register_stubs(lua: &Lua, globals: &Table) -> mlua::Result<()> {
    for name in ENTITY_FUNCTIONS.iter().chain(CAMERA_FUNCTIONS) {
        globals.set(*name, lua.create_function(|_, _: MultiValue| Ok(()))?)?;
    }
    for name in SCENE_FUNCTIONS {
        globals.set(*name, lua.create_function(|_, _: MultiValue| Ok(false))?)?;
    }
    Ok(())
}

pub(crate) fn restore_stubs(lua: &Lua) -> mlua::Result<()> {
    register_stubs(lua, &lua.globals())
}

/// Registers the functions that act on the call's target.
pub(crate) fn install_target_functions<'scope, 'env: 'scope, 't: 'env>(
    lua: &Lua,
    scope: &'scope Scope<'scope, 'env>,
    ctx: &'env HostContext<'t>,
) -> mlua::Result<()> {
    let globals = lua.globals();
    let kind = ctx.with_target(|target| target.binding());

    match kind {
        Some(ScriptBinding::Object) => {
            install_entity_functions(scope, &globals, ctx)
        }
        Some(ScriptBinding::Camera) => {
            install_camera_functions(scope, &globals, ctx)
        }
        Some(ScriptBinding::Scene) => {
            install_scene_functions(scope, &globals, ctx)
        }
        _ => Ok(()),
    }
}

fn values<const N: usize>(components: [f32; N]) -> Variadic<f32> {
    components.into_iter().collect()
}

fn vec3_values(v: Vec3) -> Variadic<f32> {
    values(v.to_array())
}

fn object_fn<'scope, 'env: 'scope, 't: 'env, A, R>(
    scope: &'scope Scope<'scope, 'env>,
    ctx: &'env HostContext<'t>,
    default: R,
    f: impl Fn(&mut Entity, A) -> R + 'scope,
) -> mlua::Result<Function>
where
    A: FromLuaMulti,
    R: IntoLuaMulti + Clone + 'scope,
{
    scope.create_function(move |_, args: A| {
        Ok(ctx
            .with_object(|entity| f(entity, args))
            .unwrap_or_else(|| default.clone()))
    })
}

fn camera_fn<'scope, 'env: 'scope, 't: 'env, A, R>(
    scope: &'scope Scope<'scope, 'env>,
    ctx: &'env HostContext<'t>,
    default: R,
    f: impl Fn(&mut Camera, A) -> R + 'scope,
) -> mlua::Result<Function>
where
    A: FromLuaMulti,
    R: IntoLuaMulti + Clone + 'scope,
{
    scope.create_function(move |_, args: A| {
        Ok(ctx
            .with_camera(|camera| f(camera, args))
            .unwrap_or_else(|| default.clone()))
    })
}

fn scene_fn<'scope, 'env: 'scope, 't: 'env, A, R>(
    scope: &'scope Scope<'scope, 'env>,
    ctx: &'env HostContext<'t>,
    default: R,
    f: impl Fn(&mut SceneRegistry, A) -> R + 'scope,
) -> mlua::Result<Function>
where
    A: FromLuaMulti,
    R: IntoLuaMulti + Clone + 'scope,
{
    scope.create_function(move |_, args: A| {
        Ok(ctx
            .with_scene(|registry| f(registry, args))
            .unwrap_or_else(|| default.clone()))
    })
}

fn install_entity_functions<'scope, 'env: 'scope, 't: 'env>(
    scope: &'scope Scope<'scope, 'env>,
    globals: &Table,
    ctx: &'env HostContext<'t>,
) -> mlua::Result<()> {
    globals.set(
        "setPosition",
        object_fn(scope, ctx, (), |entity, (x, y, z): (f32, f32, Option<f32>)| {
            entity.set_position(Vec3::new(x, y, z.unwrap_or(0.0)))
        })?,
    )?;
    globals.set(
        "getPosition",
        object_fn(scope, ctx, Variadic::new(), |entity, ()| {
            vec3_values(entity.position())
        })?,
    )?;
    globals.set(
        "setRotation",
        object_fn(scope, ctx, (), |entity, (x, y, z): (f32, f32, f32)| {
            entity.set_rotation(Vec3::new(x, y, z))
        })?,
    )?;
    globals.set(
        "getRotation",
        object_fn(scope, ctx, Variadic::new(), |entity, ()| {
            vec3_values(entity.rotation())
        })?,
    )?;
    globals.set(
        "setScale",
        object_fn(scope, ctx, (), |entity, (x, y, z): (f32, f32, Option<f32>)| {
            entity.set_scale(Vec3::new(x, y, z.unwrap_or(1.0)))
        })?,
    )?;
    globals.set(
        "getScale",
        object_fn(scope, ctx, Variadic::new(), |entity, ()| {
            vec3_values(entity.scale())
        })?,
    )?;
    globals.set(
        "setColor",
        object_fn(
            scope,
            ctx,
            (),
            |entity, (r, g, b, a): (f32, f32, f32, Option<f32>)| {
                entity.set_color(Vec4::new(r, g, b, a.unwrap_or(1.0)))
            },
        )?,
    )?;
    globals.set(
        "getColor",
        object_fn(scope, ctx, Variadic::new(), |entity, ()| {
            values(entity.color().to_array())
        })?,
    )?;
    globals.set(
        "setVisible",
        object_fn(scope, ctx, (), |entity, visible: bool| {
            entity.set_visible(visible)
        })?,
    )?;
    globals.set(
        "isVisible",
        object_fn(scope, ctx, None, |entity, ()| Some(entity.is_visible()))?,
    )?;
    globals.set(
        "setUniform",
        object_fn(
            scope,
            ctx,
            false,
            |entity, (name, components): (String, Variadic<f32>)| {
                let Some(value) = uniform_from_components(&components) else {
                    return false;
                };
                match entity.material() {
                    Some(material) => {
                        material.borrow_mut().set_uniform(&name, value);
                        true
                    }
                    None => false,
                }
            },
        )?,
    )?;

    Ok(())
}

fn uniform_from_components(components: &[f32]) -> Option<UniformValue> {
    match *components {
        [x] => Some(UniformValue::Float(x)),
        [x, y, z] => Some(UniformValue::Vec3(Vec3::new(x, y, z))),
        [x, y, z, w] => Some(UniformValue::Vec4(Vec4::new(x, y, z, w))),
        _ if components.len() == 16 => {
            Some(UniformValue::Mat4(Mat4::from_cols_slice(components)))
        }
        _ => None,
    }
}

fn install_camera_functions<'scope, 'env: 'scope, 't: 'env>(
    scope: &'scope Scope<'scope, 'env>,
    globals: &Table,
    ctx: &'env HostContext<'t>,
) -> mlua::Result<()> {
    globals.set(
        "setCameraPosition",
        camera_fn(scope, ctx, (), |camera, (x, y, z): (f32, f32, f32)| {
            camera.set_position(Vec3::new(x, y, z))
        })?,
    )?;
    globals.set(
        "getCameraPosition",
        camera_fn(scope, ctx, Variadic::new(), |camera, ()| {
            vec3_values(camera.position())
        })?,
    )?;
    globals.set(
        "setCameraTarget",
        camera_fn(scope, ctx, (), |camera, (x, y, z): (f32, f32, f32)| {
            camera.set_target(Vec3::new(x, y, z))
        })?,
    )?;
    globals.set(
        "getCameraTarget",
        camera_fn(scope, ctx, Variadic::new(), |camera, ()| {
            vec3_values(camera.target())
        })?,
    )?;
    globals.set(
        "setCameraUp",
        camera_fn(scope, ctx, (), |camera, (x, y, z): (f32, f32, f32)| {
            camera.set_up(Vec3::new(x, y, z))
        })?,
    )?;
    globals.set(
        "getCameraUp",
        camera_fn(scope, ctx, Variadic::new(), |camera, ()| {
            vec3_values(camera.up())
        })?,
    )?;
    globals.set(
        "lookAt",
        camera_fn(
            scope,
            ctx,
            (),
            |camera,
             (ex, ey, ez, tx, ty, tz, ux, uy, uz): (
                f32,
                f32,
                f32,
                f32,
                f32,
                f32,
                Option<f32>,
                Option<f32>,
                Option<f32>,
            )| {
                camera.look_at(
                    Vec3::new(ex, ey, ez),
                    Vec3::new(tx, ty, tz),
                    Vec3::new(ux.unwrap_or(0.0), uy.unwrap_or(1.0), uz.unwrap_or(0.0)),
                )
            },
        )?,
    )?;
    globals.set(
        "setPerspective",
        camera_fn(
            scope,
            ctx,
            (),
            |camera, (fov, aspect, near, far): (f32, f32, f32, f32)| {
                camera.set_perspective(fov, aspect, near, far)
            },
        )?,
    )?;
    globals.set(
        "setFOV",
        camera_fn(scope, ctx, (), |camera, fov: f32| camera.set_fov(fov))?,
    )?;
    globals.set(
        "getFOV",
        camera_fn(scope, ctx, None, |camera, ()| Some(camera.fov()))?,
    )?;
    globals.set(
        "setAspectRatio",
        camera_fn(scope, ctx, (), |camera, aspect: f32| {
            camera.set_aspect_ratio(aspect)
        })?,
    )?;
    globals.set(
        "setNearFar",
        camera_fn(scope, ctx, (), |camera, (near, far): (f32, f32)| {
            camera.set_near_far(near, far)
        })?,
    )?;

    let moves: [(&str, fn(&mut Camera, f32)); 9] = [
        ("moveForward", Camera::move_forward),
        ("moveBackward", Camera::move_backward),
        ("moveLeft", Camera::move_left),
        ("moveRight", Camera::move_right),
        ("moveUp", Camera::move_up),
        ("moveDown", Camera::move_down),
        ("rotateYaw", Camera::rotate_yaw),
        ("rotatePitch", Camera::rotate_pitch),
        ("rotateRoll", Camera::rotate_roll),
    ];
    for (name, action) in moves {
        globals.set(
            name,
            camera_fn(scope, ctx, (), move |camera, amount: f32| {
                action(camera, amount)
            })?,
        )?;
    }

    Ok(())
}

fn install_scene_functions<'scope, 'env: 'scope, 't: 'env>(
    scope: &'scope Scope<'scope, 'env>,
    globals: &Table,
    ctx: &'env HostContext<'t>,
) -> mlua::Result<()> {
    globals.set(
        "createObject",
        scene_fn(scope, ctx, false, |registry, (name, kind): (String, String)| {
            registry.create_object(&name, &kind).is_some()
        })?,
    )?;
    globals.set(
        "createShader",
        scene_fn(
            scope,
            ctx,
            false,
            |registry, (name, vertex, fragment): (String, String, String)| {
                registry
                    .create_shader(&name, Path::new(&vertex), Path::new(&fragment))
                    .is_some()
            },
        )?,
    )?;
    globals.set(
        "createModel",
        scene_fn(scope, ctx, false, |registry, (name, path): (String, String)| {
            registry.create_model_object(&name, Path::new(&path)).is_some()
        })?,
    )?;
    globals.set(
        "attachShaderToObject",
        scene_fn(
            scope,
            ctx,
            false,
            |registry, (object, shader): (String, String)| {
                registry.attach_shader_to_object(&object, &shader)
            },
        )?,
    )?;
    globals.set(
        "attachScriptToObject",
        scene_fn(scope, ctx, false, |registry, (object, path): (String, String)| {
            registry.attach_script_to_object(&object, Path::new(&path))
        })?,
    )?;
    globals.set(
        "getObjectByName",
        scene_fn(scope, ctx, false, |registry, name: String| {
            registry.get_object_by_name(&name).is_some()
        })?,
    )?;
    globals.set(
        "removeObject",
        scene_fn(scope, ctx, false, |registry, name: String| {
            registry.remove_object(&name)
        })?,
    )?;
    globals.set(
        "listObjects",
        scene_fn(scope, ctx, Vec::new(), |registry, ()| registry.list_objects())?,
    )?;
    globals.set(
        "reloadScript",
        scene_fn(scope, ctx, false, |registry, ()| registry.reload_script())?,
    )?;
    globals.set(
        "clearScene",
        scene_fn(scope, ctx, false, |registry, ()| {
            registry.clear_scene();
            true
        })?,
    )?;

    globals.set(
        "setObjectPosition",
        scene_fn(
            scope,
            ctx,
            false,
            |registry, (name, x, y, z): (String, f32, f32, Option<f32>)| {
                registry
                    .with_object(&name, |entity| {
                        entity.set_position(Vec3::new(x, y, z.unwrap_or(0.0)))
                    })
                    .is_some()
            },
        )?,
    )?;
    globals.set(
        "getObjectPosition",
        scene_fn(scope, ctx, vec3_values(Vec3::ZERO), |registry, name: String| {
            vec3_values(object_or(registry, &name, Vec3::ZERO, Entity::position))
        })?,
    )?;
    globals.set(
        "setObjectRotation",
        scene_fn(
            scope,
            ctx,
            false,
            |registry, (name, x, y, z): (String, f32, f32, f32)| {
                registry
                    .with_object(&name, |entity| entity.set_rotation(Vec3::new(x, y, z)))
                    .is_some()
            },
        )?,
    )?;
    globals.set(
        "getObjectRotation",
        scene_fn(scope, ctx, vec3_values(Vec3::ZERO), |registry, name: String| {
            vec3_values(object_or(registry, &name, Vec3::ZERO, Entity::rotation))
        })?,
    )?;
    globals.set(
        "setObjectScale",
        scene_fn(
            scope,
            ctx,
            false,
            |registry, (name, x, y, z): (String, f32, f32, Option<f32>)| {
                registry
                    .with_object(&name, |entity| {
                        entity.set_scale(Vec3::new(x, y, z.unwrap_or(1.0)))
                    })
                    .is_some()
            },
        )?,
    )?;
    globals.set(
        "getObjectScale",
        scene_fn(scope, ctx, vec3_values(Vec3::ONE), |registry, name: String| {
            vec3_values(object_or(registry, &name, Vec3::ONE, Entity::scale))
        })?,
    )?;
    globals.set(
        "setObjectColor",
        scene_fn(
            scope,
            ctx,
            false,
            |registry, (name, r, g, b, a): (String, f32, f32, f32, Option<f32>)| {
                registry
                    .with_object(&name, |entity| {
                        entity.set_color(Vec4::new(r, g, b, a.unwrap_or(1.0)))
                    })
                    .is_some()
            },
        )?,
    )?;
    globals.set(
        "getObjectColor",
        scene_fn(
            scope,
            ctx,
            values(Vec4::ONE.to_array()),
            |registry, name: String| {
                values(object_or(registry, &name, Vec4::ONE, Entity::color).to_array())
            },
        )?,
    )?;
    globals.set(
        "setObjectVisible",
        scene_fn(
            scope,
            ctx,
            false,
            |registry, (name, visible): (String, bool)| {
                registry
                    .with_object(&name, |entity| entity.set_visible(visible))
                    .is_some()
            },
        )?,
    )?;
    globals.set(
        "isObjectVisible",
        scene_fn(scope, ctx, false, |registry, name: String| {
            object_or(registry, &name, false, Entity::is_visible)
        })?,
    )?;

    globals.set(
        "getMeshCount",
        scene_fn(scope, ctx, 0usize, |registry, name: String| {
            registry
                .get_object_by_name(&name)
                .and_then(Entity::model)
                .map_or(0, |model| model.mesh_count())
        })?,
    )?;
    globals.set(
        "getMaterialName",
        scene_fn(
            scope,
            ctx,
            String::new(),
            |registry, (name, index): (String, usize)| {
                registry
                    .get_object_by_name(&name)
                    .and_then(Entity::model)
                    .map(|model| model.material_name(index).to_string())
                    .unwrap_or_default()
            },
        )?,
    )?;
    globals.set(
        "loadTextureForMesh",
        scene_fn(
            scope,
            ctx,
            false,
            |registry, (name, index, path, flip_v): (String, usize, String, Option<bool>)| {
                registry
                    .with_object(&name, |entity| {
                        entity.model_mut().is_some_and(|model| {
                            model.load_texture_for_mesh(index, Path::new(&path), flip_v.unwrap_or(false))
                        })
                    })
                    .unwrap_or(false)
            },
        )?,
    )?;

    Ok(())
}

fn object_or<T>(registry: &SceneRegistry, name: &str, default: T, get: fn(&Entity) -> T) -> T {
    registry.get_object_by_name(name).map_or(default, get)
}

/// Transform components mirrored into script globals around `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransformSlot {
    Position,
    Rotation,
    Scale,
    CameraPosition,
    CameraTarget,
    CameraUp,
}

impl TransformSlot {
    const ENTITY: [TransformSlot; 3] = [
        TransformSlot::Position,
        TransformSlot::Rotation,
        TransformSlot::Scale,
    ];
    const CAMERA: [TransformSlot; 3] = [
        TransformSlot::CameraPosition,
        TransformSlot::CameraTarget,
        TransformSlot::CameraUp,
    ];

    fn global_name(self) -> &'static str {
        match self {
            TransformSlot::Position | TransformSlot::CameraPosition => "position",
            TransformSlot::Rotation => "rotation",
            TransformSlot::Scale => "scale",
            TransformSlot::CameraTarget => "target",
            TransformSlot::CameraUp => "up",
        }
    }

    fn read(self, target: &ScriptTarget<'_>) -> Option<Vec3> {
        match (self, target) {
            (TransformSlot::Position, ScriptTarget::Object(entity)) => Some(entity.position()),
            (TransformSlot::Rotation, ScriptTarget::Object(entity)) => Some(entity.rotation()),
            (TransformSlot::Scale, ScriptTarget::Object(entity)) => Some(entity.scale()),
            (TransformSlot::CameraPosition, ScriptTarget::Camera(camera)) => {
                Some(camera.position())
            }
            (TransformSlot::CameraTarget, ScriptTarget::Camera(camera)) => Some(camera.target()),
            (TransformSlot::CameraUp, ScriptTarget::Camera(camera)) => Some(camera.up()),
            _ => None,
        }
    }

    fn write(self, target: &mut ScriptTarget<'_>, value: Vec3) {
        match (self, target) {
            (TransformSlot::Position, ScriptTarget::Object(entity)) => entity.set_position(value),
            (TransformSlot::Rotation, ScriptTarget::Object(entity)) => entity.set_rotation(value),
            (TransformSlot::Scale, ScriptTarget::Object(entity)) => entity.set_scale(value),
            (TransformSlot::CameraPosition, ScriptTarget::Camera(camera)) => {
                camera.set_position(value)
            }
            (TransformSlot::CameraTarget, ScriptTarget::Camera(camera)) => {
                camera.set_target(value)
            }
            (TransformSlot::CameraUp, ScriptTarget::Camera(camera)) => camera.set_up(value),
            _ => {}
        }
    }
}

/// Values published before a call, compared against the globals afterwards.
pub(crate) struct PublishedTransform {
    slots: Vec<(TransformSlot, Vec3)>,
}

pub(crate) fn publish_transform(
    lua: &Lua,
    ctx: &HostContext<'_>,
) -> mlua::Result<PublishedTransform> {
    let slots: Vec<(TransformSlot, Vec3)> = ctx
        .with_target(|target| {
            let slots: &[TransformSlot] = match target {
                ScriptTarget::Object(_) => &TransformSlot::ENTITY,
                ScriptTarget::Camera(_) => &TransformSlot::CAMERA,
                _ => &[],
            };
            slots
                .iter()
                .filter_map(|slot| slot.read(target).map(|value| (*slot, value)))
                .collect()
        })
        .unwrap_or_default();

    let globals = lua.globals();
    for (slot, value) in &slots {
        let table = lua.create_table()?;
        table.set("x", value.x)?;
        table.set("y", value.y)?;
        table.set("z", value.z)?;
        globals.set(slot.global_name(), table)?;
    }

    Ok(PublishedTransform { slots })
}

/// Applies transform globals the script changed during the call.
pub(crate) fn apply_transform(
    lua: &Lua,
    ctx: &HostContext<'_>,
    published: &PublishedTransform,
) -> mlua::Result<()> {
    let globals = lua.globals();

    for (slot, before) in &published.slots {
        let Some(table) = globals.get::<Option<Table>>(slot.global_name())? else {
            continue;
        };

        let after = Vec3::new(
            table.get::<Option<f32>>("x")?.unwrap_or(before.x),
            table.get::<Option<f32>>("y")?.unwrap_or(before.y),
            table.get::<Option<f32>>("z")?.unwrap_or(before.z),
        );

        if after != *before {
            ctx.with_target(|target| slot.write(target, after));
        }
    }

    Ok(())
}
