use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
#[cfg(feature = "ege-serde")]
use serde::{Deserialize, Serialize};

/// Width and height of a drawable surface, in physical pixels.
#[repr(C)]
#[derive(Hash, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "ege-serde", derive(Serialize, Deserialize))]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either dimension is zero, e.g. while the window is minimized.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<ash::vk::Extent2D> for Extent2D {
    fn from(e: ash::vk::Extent2D) -> Self {
        Self::new(e.width, e.height)
    }
}

impl From<Extent2D> for ash::vk::Extent2D {
    fn from(e: Extent2D) -> Self {
        ash::vk::Extent2D {
            width: e.width,
            height: e.height,
        }
    }
}

/// Vertex layout consumed by the simple shader: location 0 is the position,
/// location 1 the color.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[cfg_attr(feature = "ege-serde", derive(Serialize, Deserialize))]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 3],
}

impl Vertex {
    pub const fn new(position: [f32; 2], color: [f32; 3]) -> Self {
        Self { position, color }
    }
}

/// Per-draw parameters pushed with every draw call.
///
/// Matches the shader block
/// `layout(push_constant) uniform Push { vec2 offset; vec3 color; }`:
/// the color starts on a 16 byte boundary and the record is 32 bytes long.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PushConstantBlock {
    pub offset: Vec2,
    _pad0: [f32; 2],
    pub color: Vec3,
    _pad1: f32,
}

impl PushConstantBlock {
    pub fn new(offset: Vec2, color: Vec3) -> Self {
        Self {
            offset,
            _pad0: [0.0; 2],
            color,
            _pad1: 0.0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Values the color and depth/stencil targets are cleared to when a render
/// pass begins.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "ege-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "ege-serde", serde(default))]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Locations of the precompiled SPIR-V stages used by the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "ege-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "ege-serde", serde(default))]
pub struct ShaderPaths {
    pub vertex: String,
    pub fragment: String,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self {
            vertex: "shaders/simple_shader.vert.spv".to_string(),
            fragment: "shaders/simple_shader.frag.spv".to_string(),
        }
    }
}
