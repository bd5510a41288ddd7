use std::collections::HashMap;
use std::fmt;

use crate::error::BindingError;
use crate::gl::{BufferTarget, GraphicsApi, Handle, ResourceKind};

/// Stateless strategy that performs the native activation for one kind.
pub trait Binder: Send + Sync + fmt::Debug {
    fn bind(&self, gl: &dyn GraphicsApi, handle: Handle) -> Result<(), BindingError>;

    /// Deactivates `handle` and returns the handle to treat as active
    /// afterwards.
    fn unbind(&self, gl: &dyn GraphicsApi, handle: Handle) -> Result<Handle, BindingError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VertexArrayBinder;

impl Binder for VertexArrayBinder {
    fn bind(&self, gl: &dyn GraphicsApi, handle: Handle) -> Result<(), BindingError> {
        gl.bind_vertex_array(handle)
    }

    fn unbind(&self, gl: &dyn GraphicsApi, _handle: Handle) -> Result<Handle, BindingError> {
        gl.bind_vertex_array(Handle::NONE)?;
        Ok(Handle::NONE)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BufferBinder {
    target: BufferTarget,
}

impl BufferBinder {
    /// Creates a binder for buffers at `target`.
    pub fn new(target: BufferTarget) -> Self {
        Self { target }
    }
}

impl Binder for BufferBinder {
    fn bind(&self, gl: &dyn GraphicsApi, handle: Handle) -> Result<(), BindingError> {
        gl.bind_buffer(self.target, handle)
    }

    fn unbind(&self, gl: &dyn GraphicsApi, _handle: Handle) -> Result<Handle, BindingError> {
        gl.bind_buffer(self.target, Handle::NONE)?;
        Ok(Handle::NONE)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextureBinder;

impl Binder for TextureBinder {
    fn bind(&self, gl: &dyn GraphicsApi, handle: Handle) -> Result<(), BindingError> {
        gl.bind_texture(handle)
    }

    fn unbind(&self, gl: &dyn GraphicsApi, _handle: Handle) -> Result<Handle, BindingError> {
        gl.bind_texture(Handle::NONE)?;
        Ok(Handle::NONE)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramBinder;

impl Binder for ProgramBinder {
    fn bind(&self, gl: &dyn GraphicsApi, handle: Handle) -> Result<(), BindingError> {
        gl.use_program(handle)
    }

    fn unbind(&self, gl: &dyn GraphicsApi, _handle: Handle) -> Result<Handle, BindingError> {
        gl.use_program(Handle::NONE)?;
        Ok(Handle::NONE)
    }
}

/// Unbinding restores the default framebuffer (the window surface).
#[derive(Debug, Clone, Copy, Default)]
pub struct FramebufferBinder;

impl Binder for FramebufferBinder {
    fn bind(&self, gl: &dyn GraphicsApi, handle: Handle) -> Result<(), BindingError> {
        gl.bind_framebuffer(handle)
    }

    fn unbind(&self, gl: &dyn GraphicsApi, _handle: Handle) -> Result<Handle, BindingError> {
        gl.bind_framebuffer(Handle::NONE)?;
        Ok(Handle::NONE)
    }
}

/// Static kind → binder registration table, built before any
/// [`crate::BindingContext`].
#[derive(Debug, Default)]
pub struct BinderTable {
    binders: HashMap<ResourceKind, Box<dyn Binder>>,
}

impl BinderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with a binder for every [`ResourceKind`].
    pub fn standard() -> Self {
        Self::new()
            .register(ResourceKind::VertexArray, VertexArrayBinder)
            .register(ResourceKind::VertexBuffer, BufferBinder::new(BufferTarget::Array))
            .register(ResourceKind::IndexBuffer, BufferBinder::new(BufferTarget::ElementArray))
            .register(ResourceKind::Texture, TextureBinder)
            .register(ResourceKind::Program, ProgramBinder)
            .register(ResourceKind::Framebuffer, FramebufferBinder)
    }

    /// Registers `binder` for `kind`, replacing any earlier registration.
    pub fn register(mut self, kind: ResourceKind, binder: impl Binder + 'static) -> Self {
        self.binders.insert(kind, Box::new(binder));
        self
    }

    pub fn len(&self) -> usize {
        self.binders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binders.is_empty()
    }

    pub(crate) fn into_entries(self) -> impl Iterator<Item = (ResourceKind, Box<dyn Binder>)> {
        self.binders.into_iter()
    }
}
