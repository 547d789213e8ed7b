use std::collections::BTreeMap;

use glam::{Mat4, Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Int,
    Vec3,
    Vec4,
    Mat4,
    /// Present in the block but not settable from the engine.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Mat4(_) => UniformKind::Mat4,
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            UniformValue::Float(value) => bytemuck::bytes_of(value),
            UniformValue::Int(value) => bytemuck::bytes_of(value),
            UniformValue::Vec3(value) => bytemuck::bytes_of(value),
            UniformValue::Vec4(value) => bytemuck::bytes_of(value),
            UniformValue::Mat4(value) => bytemuck::bytes_of(value),
        }
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        UniformValue::Int(value)
    }
}

impl From<Vec3> for UniformValue {
    fn from(value: Vec3) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<Vec4> for UniformValue {
    fn from(value: Vec4) -> Self {
        UniformValue::Vec4(value)
    }
}

impl From<Mat4> for UniformValue {
    fn from(value: Mat4) -> Self {
        UniformValue::Mat4(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformField {
    pub offset: u32,
    pub kind: UniformKind,
}

/// Member layout of the uniform struct bound at group 0, binding 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniformLayout {
    fields: BTreeMap<String, UniformField>,
    size: u32,
}

impl UniformLayout {
    pub fn new(size: u32) -> Self {
        Self {
            fields: BTreeMap::new(),
            size,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, field: UniformField) {
        self.fields.insert(name.into(), field);
    }

    pub fn get(&self, name: &str) -> Option<UniformField> {
        self.fields.get(name).copied()
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// CPU copy of a material's uniform struct.
#[derive(Debug, Clone, Default)]
pub struct UniformBlock {
    layout: UniformLayout,
    bytes: Vec<u8>,
}

impl UniformBlock {
    pub fn new(layout: UniformLayout) -> Self {
        let bytes = vec![0; layout.size() as usize];
        Self { layout, bytes }
    }

    /// Writes `value` into the member called `name`. Returns false when
    /// there is no such member or its type differs.
    pub fn set(&mut self, name: &str, value: UniformValue) -> bool {
        let Some(field) = self.layout.get(name) else {
            log::trace!("No uniform named {name}");
            return false;
        };

        if field.kind != value.kind() {
            log::trace!(
                "Uniform {name} is {:?}, ignoring {:?}",
                field.kind,
                value.kind()
            );
            return false;
        }

        let data = value.bytes();
        let start = field.offset as usize;
        let Some(target) = self.bytes.get_mut(start..start + data.len()) else {
            return false;
        };
        target.copy_from_slice(data);
        true
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        let field = self.layout.get(name)?;
        let len = match field.kind {
            UniformKind::Float | UniformKind::Int => 4,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::Mat4 => 64,
            UniformKind::Other => return None,
        };
        let start = field.offset as usize;
        self.bytes.get(start..start + len)
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> UniformLayout {
        let mut layout = UniformLayout::new(96);
        layout.insert(
            "viewMatrix",
            UniformField {
                offset: 0,
                kind: UniformKind::Mat4,
            },
        );
        layout.insert(
            "objectColor",
            UniformField {
                offset: 64,
                kind: UniformKind::Vec4,
            },
        );
        layout.insert(
            "time",
            UniformField {
                offset: 80,
                kind: UniformKind::Float,
            },
        );
        layout
    }

    #[test]
    fn writes_at_member_offset() {
        let mut block = UniformBlock::new(layout());
        assert!(block.set("time", 2.5f32.into()));
        assert_eq!(block.get("time"), Some(&2.5f32.to_ne_bytes()[..]));
        assert!(block.bytes()[..80].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn unknown_names_and_mismatched_kinds_are_skipped() {
        let mut block = UniformBlock::new(layout());
        let before = block.bytes().to_vec();
        assert!(!block.set("missing", 1.0f32.into()));
        assert!(!block.set("objectColor", 1.0f32.into()));
        assert_eq!(block.bytes(), &before[..]);
    }
}
