//! Native call surface.
//!
//! Everything that would touch driver state goes through [`GraphicsApi`].
//! Binders and bindable resources are the only callers of its `bind_*`
//! family; the rest of the crate reaches native state through them.

mod recording;

use serde::{Deserialize, Serialize};

use crate::{error::BindingError, uniform::UniformValue};

pub use recording::{GlCall, RecordingApi};

/// Opaque identifier of an allocated GPU object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Handle(pub u32);

impl Handle {
    /// Sentinel for "nothing bound".
    pub const NONE: Handle = Handle(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// Category of a bindable resource. Each kind owns exactly one exclusivity
/// group inside a [`crate::BindingContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    VertexArray,
    VertexBuffer,
    IndexBuffer,
    Texture,
    Program,
    Framebuffer,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::VertexArray,
        ResourceKind::VertexBuffer,
        ResourceKind::IndexBuffer,
        ResourceKind::Texture,
        ResourceKind::Program,
        ResourceKind::Framebuffer,
    ];
}

/// Buffer binding points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
}

impl BufferTarget {
    pub fn kind(self) -> ResourceKind {
        match self {
            BufferTarget::Array => ResourceKind::VertexBuffer,
            BufferTarget::ElementArray => ResourceKind::IndexBuffer,
        }
    }
}

/// Primitive assembly mode used by draw calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawMode {
    Points,
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl DrawMode {
    /// Next mode in declaration order, wrapping around.
    pub fn next(self) -> DrawMode {
        match self {
            DrawMode::Points => DrawMode::Lines,
            DrawMode::Lines => DrawMode::LineStrip,
            DrawMode::LineStrip => DrawMode::Triangles,
            DrawMode::Triangles => DrawMode::TriangleStrip,
            DrawMode::TriangleStrip => DrawMode::TriangleFan,
            DrawMode::TriangleFan => DrawMode::Points,
        }
    }
}

/// Fixed-function toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Blend,
    DepthTest,
    CullFace,
    ScissorTest,
}

/// A single float attribute inside an interleaved vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub components: usize,
    /// Offset in floats from the start of a vertex.
    pub offset: usize,
}

/// Thin abstraction over the graphics driver.
///
/// Implementations must be callable from the rendering thread only; the
/// `Send + Sync` bound exists so that the shared binding state can live in
/// `Arc`s handed to producer code, not so that producers can issue calls.
pub trait GraphicsApi: Send + Sync {
    fn create(&self, kind: ResourceKind) -> Result<Handle, BindingError>;
    fn delete(&self, kind: ResourceKind, handle: Handle);

    fn bind_vertex_array(&self, handle: Handle) -> Result<(), BindingError>;
    fn bind_buffer(&self, target: BufferTarget, handle: Handle) -> Result<(), BindingError>;
    fn bind_texture(&self, handle: Handle) -> Result<(), BindingError>;
    fn use_program(&self, handle: Handle) -> Result<(), BindingError>;
    fn bind_framebuffer(&self, handle: Handle) -> Result<(), BindingError>;

    /// Uploads to the vertex buffer currently bound. `upload_indices` writes
    /// the element buffer of the active vertex array.
    fn upload_vertices(&self, data: &[f32]) -> Result<(), BindingError>;
    fn upload_indices(&self, data: &[u32]) -> Result<(), BindingError>;

    /// Describes an attribute of the currently bound vertex buffer.
    /// `stride` is in floats.
    fn vertex_attribute(&self, attribute: VertexAttribute, stride: usize);
    fn set_attribute_enabled(&self, location: u32, enabled: bool) -> Result<(), BindingError>;
    fn set_capability(&self, capability: Capability, enabled: bool) -> Result<(), BindingError>;

    fn uniform_location(&self, program: Handle, name: &str) -> Option<i32>;
    fn set_uniform(&self, location: i32, value: &UniformValue) -> Result<(), BindingError>;

    fn draw_arrays(&self, mode: DrawMode, first: usize, count: usize);
    fn draw_elements(&self, mode: DrawMode, count: usize);
}
