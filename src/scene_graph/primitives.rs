use std::{fmt, str::FromStr};

use glam::Vec3;

use crate::rendering::backend::{ColorVertex, DrawRange, GeometryData};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Triangle,
    Rectangle,
}

impl FromStr for PrimitiveKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "triangle" => Ok(PrimitiveKind::Triangle),
            "rectangle" => Ok(PrimitiveKind::Rectangle),
            other => Err(anyhow::anyhow!("Unknown object type: {other}")),
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveKind::Triangle => f.write_str("triangle"),
            PrimitiveKind::Rectangle => f.write_str("rectangle"),
        }
    }
}

const fn vertex(position: [f32; 3], color: [f32; 3]) -> ColorVertex {
    ColorVertex {
        position: Vec3::from_array(position),
        color: Vec3::from_array(color),
    }
}

const TRIANGLE_VERTICES: [ColorVertex; 3] = [
    vertex([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0]),
    vertex([0.5, -0.5, 0.0], [0.0, 1.0, 0.0]),
    vertex([0.0, 0.5, 0.0], [0.0, 0.0, 1.0]),
];

const RECTANGLE_VERTICES: [ColorVertex; 4] = [
    vertex([0.5, 0.5, 0.0], [1.0, 0.0, 0.0]),
    vertex([0.5, -0.5, 0.0], [0.0, 1.0, 0.0]),
    vertex([-0.5, -0.5, 0.0], [0.0, 0.0, 1.0]),
    vertex([-0.5, 0.5, 0.0], [1.0, 1.0, 0.0]),
];

const RECTANGLE_INDICES: [u32; 6] = [0, 1, 3, 1, 2, 3];

impl PrimitiveKind {
    pub fn geometry(self) -> GeometryData<'static> {
        match self {
            PrimitiveKind::Triangle => GeometryData::Colored {
                vertices: &TRIANGLE_VERTICES,
                indices: None,
            },
            PrimitiveKind::Rectangle => GeometryData::Colored {
                vertices: &RECTANGLE_VERTICES,
                indices: Some(&RECTANGLE_INDICES),
            },
        }
    }

    pub fn draw_range(self) -> DrawRange {
        match self {
            PrimitiveKind::Triangle => DrawRange::Vertices(3),
            PrimitiveKind::Rectangle => DrawRange::Indexed(6),
        }
    }
}
