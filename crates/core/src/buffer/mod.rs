//! Vertex arrays and the buffers they own.
//!
//! A [`VertexArray`] owns at most one [`VertexBuffer`] and one
//! [`IndexBuffer`]. Native handles are created in [`VertexArray::init`] and
//! released in [`VertexArray::dispose`], both on the rendering thread.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bind::{Bindable, BindingContext, BoundResource, ExclusivityGroup};
use crate::error::BindingError;
use crate::gl::{DrawMode, GraphicsApi, Handle, ResourceKind, VertexAttribute};
use crate::{Result, VizError};

/// Lifecycle of a GPU object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BufferState {
    Uninitialized,
    Initialized,
    Disposed,
}

/// Enables one vertex attribute array while bound.
struct AttributeArray {
    gl: Arc<dyn GraphicsApi>,
    location: u32,
}

impl Bindable for AttributeArray {
    fn bind_impl(&self) -> std::result::Result<(), BindingError> {
        self.gl.set_attribute_enabled(self.location, true)
    }

    fn unbind_impl(&self) -> std::result::Result<(), BindingError> {
        self.gl.set_attribute_enabled(self.location, false)
    }
}

impl fmt::Debug for AttributeArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeArray")
            .field("location", &self.location)
            .finish()
    }
}

/// Interleaved float vertex data.
#[derive(Debug)]
pub struct VertexBuffer {
    data: Vec<f32>,
    attributes: Vec<VertexAttribute>,
    stride: usize,
    handle: Handle,
    arrays: Vec<BoundResource<AttributeArray>>,
}

impl VertexBuffer {
    /// Builds a buffer whose stride is derived from `attributes`.
    pub fn new(data: Vec<f32>, attributes: Vec<VertexAttribute>) -> Result<Self> {
        let stride = attributes
            .iter()
            .map(|attribute| attribute.offset + attribute.components)
            .max()
            .unwrap_or(0);

        if stride == 0 {
            return Err(VizError::msg("vertex buffer needs at least one attribute"));
        }
        if data.len() % stride != 0 {
            return Err(VizError::msg(format!(
                "vertex data length {} is not a multiple of the stride {stride}",
                data.len()
            )));
        }

        Ok(Self {
            data,
            attributes,
            stride,
            handle: Handle::NONE,
            arrays: Vec::new(),
        })
    }

    /// Single attribute at location 0 with `components` floats per vertex.
    pub fn positions(data: Vec<f32>, components: usize) -> Result<Self> {
        Self::new(
            data,
            vec![VertexAttribute {
                location: 0,
                components,
                offset: 0,
            }],
        )
    }

    pub fn vertex_count(&self) -> usize {
        self.data.len() / self.stride
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    fn init(&mut self, gl: &Arc<dyn GraphicsApi>, group: &ExclusivityGroup) -> Result<()> {
        self.handle = gl.create(ResourceKind::VertexBuffer)?;
        group.bind(self.handle)?;
        gl.upload_vertices(&self.data)?;

        for attribute in &self.attributes {
            gl.vertex_attribute(*attribute, self.stride);
            let array = BoundResource::new(AttributeArray {
                gl: gl.clone(),
                location: attribute.location,
            });
            array.bind();
            self.arrays.push(array);
        }
        Ok(())
    }

    fn dispose(&mut self, gl: &dyn GraphicsApi, group: &ExclusivityGroup) {
        // Attribute enables belong to the owning vertex array and die with it.
        self.arrays.clear();
        if !self.handle.is_none() {
            group.forget(self.handle);
            gl.delete(ResourceKind::VertexBuffer, self.handle);
            self.handle = Handle::NONE;
        }
    }
}

/// Element indices for indexed drawing.
#[derive(Debug)]
pub struct IndexBuffer {
    indices: Vec<u32>,
    handle: Handle,
}

impl IndexBuffer {
    pub fn new(indices: Vec<u32>) -> Self {
        Self {
            indices,
            handle: Handle::NONE,
        }
    }

    pub fn element_count(&self) -> usize {
        self.indices.len()
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    fn init(&mut self, gl: &dyn GraphicsApi, group: &ExclusivityGroup) -> Result<()> {
        self.handle = gl.create(ResourceKind::IndexBuffer)?;
        group.bind(self.handle)?;
        gl.upload_indices(&self.indices)?;
        Ok(())
    }

    fn dispose(&mut self, gl: &dyn GraphicsApi, group: &ExclusivityGroup) {
        if !self.handle.is_none() {
            group.forget(self.handle);
            gl.delete(ResourceKind::IndexBuffer, self.handle);
            self.handle = Handle::NONE;
        }
    }
}

/// Top-level bindable object owning optional vertex and index children.
pub struct VertexArray {
    gl: Arc<dyn GraphicsApi>,
    arrays: Arc<ExclusivityGroup>,
    vertex_group: Arc<ExclusivityGroup>,
    index_group: Arc<ExclusivityGroup>,
    handle: Handle,
    state: BufferState,
    vertices: Option<VertexBuffer>,
    indices: Option<IndexBuffer>,
    draw_mode: DrawMode,
}

impl VertexArray {
    pub fn new(context: &BindingContext) -> Result<Self> {
        Ok(Self {
            gl: context.gl().clone(),
            arrays: context.exclusivity_group(ResourceKind::VertexArray)?,
            vertex_group: context.exclusivity_group(ResourceKind::VertexBuffer)?,
            index_group: context.exclusivity_group(ResourceKind::IndexBuffer)?,
            handle: Handle::NONE,
            state: BufferState::Uninitialized,
            vertices: None,
            indices: None,
            draw_mode: DrawMode::default(),
        })
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn draw_mode(&self) -> DrawMode {
        self.draw_mode
    }

    pub fn set_draw_mode(&mut self, mode: DrawMode) {
        self.draw_mode = mode;
    }

    pub fn vertex_buffer(&self) -> Option<&VertexBuffer> {
        self.vertices.as_ref()
    }

    pub fn index_buffer(&self) -> Option<&IndexBuffer> {
        self.indices.as_ref()
    }

    /// Attaches the vertex child. Attaching to an initialised array uploads
    /// the child immediately; if that upload fails the child is released and
    /// the slot stays empty.
    pub fn set_vertex_buffer(&mut self, mut buffer: VertexBuffer) -> Result<()> {
        self.ensure_attachable("vertex", self.vertices.is_some())?;
        if self.state == BufferState::Initialized {
            if let Err(err) = self.upload_vertex_child(&mut buffer) {
                buffer.dispose(self.gl.as_ref(), &self.vertex_group);
                return Err(err);
            }
        }
        self.vertices = Some(buffer);
        Ok(())
    }

    /// Attaches the index child. Attaching to an initialised array uploads
    /// the child immediately; if that upload fails the child is released and
    /// the slot stays empty.
    pub fn set_index_buffer(&mut self, mut buffer: IndexBuffer) -> Result<()> {
        self.ensure_attachable("index", self.indices.is_some())?;
        if self.state == BufferState::Initialized {
            if let Err(err) = self.upload_index_child(&mut buffer) {
                buffer.dispose(self.gl.as_ref(), &self.index_group);
                return Err(err);
            }
        }
        self.indices = Some(buffer);
        Ok(())
    }

    /// Allocates the native handle, then uploads the vertex child followed by
    /// the index child while this array is active.
    ///
    /// Any failure releases every handle allocated so far and leaves the
    /// array uninitialised, so `init` can be retried.
    pub fn init(&mut self) -> Result<()> {
        match self.state {
            BufferState::Initialized => return Ok(()),
            BufferState::Disposed => return Err(VizError::UninitializedUse("disposed vertex array")),
            BufferState::Uninitialized => {}
        }

        self.handle = self.gl.create(ResourceKind::VertexArray)?;
        if let Err(err) = self.upload_children() {
            tracing::warn!(handle = self.handle.0, error = %err, "vertex array init failed, rolling back");
            self.release_handles();
            return Err(err);
        }
        self.state = BufferState::Initialized;

        tracing::debug!(
            handle = self.handle.0,
            vertices = self.vertices.as_ref().map(VertexBuffer::vertex_count),
            elements = self.indices.as_ref().map(IndexBuffer::element_count),
            "vertex array initialised"
        );
        Ok(())
    }

    pub fn bind(&self) -> Result<()> {
        self.ensure_initialized()?;
        self.arrays.bind(self.handle)?;
        Ok(())
    }

    pub fn unbind(&self) -> Result<()> {
        self.ensure_initialized()?;
        self.arrays.unbind(self.handle)?;
        Ok(())
    }

    /// Issues one draw call covering the whole index or vertex child.
    ///
    /// Arrays with no children log a warning and draw nothing. A failed bind
    /// skips the draw for this frame.
    pub fn draw(&self) -> Result<()> {
        self.ensure_initialized()?;

        if self.indices.is_none() && self.vertices.is_none() {
            tracing::warn!(handle = self.handle.0, "vertex array has no buffers, skipping draw");
            return Ok(());
        }

        if let Err(err) = self.arrays.bind(self.handle) {
            tracing::warn!(handle = self.handle.0, error = %err, "skipping draw");
            return Ok(());
        }

        match (&self.indices, &self.vertices) {
            (Some(indices), _) => self.gl.draw_elements(self.draw_mode, indices.element_count()),
            (None, Some(vertices)) => self.gl.draw_arrays(self.draw_mode, 0, vertices.vertex_count()),
            (None, None) => {}
        }
        Ok(())
    }

    /// Releases the children, then the array itself. Safe to call any number
    /// of times; never-initialised arrays have nothing to release.
    pub fn dispose(&mut self) {
        if self.state != BufferState::Initialized {
            return;
        }

        let handle = self.handle;
        self.release_handles();
        self.vertices = None;
        self.indices = None;
        self.state = BufferState::Disposed;
        tracing::debug!(handle = handle.0, "vertex array disposed");
    }

    fn upload_children(&mut self) -> Result<()> {
        self.arrays.bind(self.handle)?;
        if let Some(vertices) = self.vertices.as_mut() {
            vertices.init(&self.gl, &self.vertex_group)?;
        }
        if let Some(indices) = self.indices.as_mut() {
            indices.init(self.gl.as_ref(), &self.index_group)?;
            // The element binding is vertex array state and changes with it.
            self.index_group.forget(indices.handle);
        }
        Ok(())
    }

    fn upload_vertex_child(&self, buffer: &mut VertexBuffer) -> Result<()> {
        self.arrays.bind(self.handle)?;
        buffer.init(&self.gl, &self.vertex_group)
    }

    fn upload_index_child(&self, buffer: &mut IndexBuffer) -> Result<()> {
        self.arrays.bind(self.handle)?;
        buffer.init(self.gl.as_ref(), &self.index_group)?;
        self.index_group.forget(buffer.handle);
        Ok(())
    }

    /// Deletes every allocated native handle, children first. Child data is
    /// kept so the array can be initialised again.
    fn release_handles(&mut self) {
        if let Some(vertices) = self.vertices.as_mut() {
            vertices.dispose(self.gl.as_ref(), &self.vertex_group);
        }
        if let Some(indices) = self.indices.as_mut() {
            indices.dispose(self.gl.as_ref(), &self.index_group);
        }
        if !self.handle.is_none() {
            self.arrays.forget(self.handle);
            self.gl.delete(ResourceKind::VertexArray, self.handle);
            self.handle = Handle::NONE;
        }
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.state != BufferState::Initialized {
            return Err(VizError::UninitializedUse("vertex array"));
        }
        Ok(())
    }

    fn ensure_attachable(&self, child: &'static str, occupied: bool) -> Result<()> {
        if self.state == BufferState::Disposed {
            return Err(VizError::UninitializedUse("disposed vertex array"));
        }
        if occupied {
            return Err(VizError::AlreadyInitialized { child });
        }
        Ok(())
    }
}

impl Drop for VertexArray {
    fn drop(&mut self) {
        if self.state == BufferState::Initialized {
            tracing::warn!(handle = self.handle.0, "vertex array dropped without dispose, handle leaked");
        }
    }
}

impl fmt::Debug for VertexArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexArray")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .field("draw_mode", &self.draw_mode)
            .field("vertices", &self.vertices)
            .field("indices", &self.indices)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::{GlCall, RecordingApi};

    fn setup() -> (Arc<RecordingApi>, BindingContext) {
        let gl = Arc::new(RecordingApi::new());
        let context = BindingContext::standard(gl.clone());
        (gl, context)
    }

    fn triangle_pair() -> VertexBuffer {
        VertexBuffer::positions(vec![0.0; 12], 2).unwrap()
    }

    #[test]
    fn draws_all_vertices_without_indices() {
        let (gl, context) = setup();
        let mut vao = VertexArray::new(&context).unwrap();
        vao.set_vertex_buffer(triangle_pair()).unwrap();
        vao.init().unwrap();

        vao.draw().unwrap();

        assert_eq!(
            gl.draw_calls(),
            vec![GlCall::DrawArrays { mode: DrawMode::Triangles, first: 0, count: 6 }]
        );
        vao.dispose();
    }

    #[test]
    fn index_child_takes_precedence() {
        let (gl, context) = setup();
        let mut vao = VertexArray::new(&context).unwrap();
        vao.set_vertex_buffer(triangle_pair()).unwrap();
        vao.set_index_buffer(IndexBuffer::new((0..12).collect())).unwrap();
        vao.set_draw_mode(DrawMode::Lines);
        vao.init().unwrap();

        vao.draw().unwrap();

        assert_eq!(
            gl.draw_calls(),
            vec![GlCall::DrawElements { mode: DrawMode::Lines, count: 12 }]
        );
        vao.dispose();
    }

    #[test]
    fn children_upload_while_array_is_bound() {
        let (gl, context) = setup();
        let mut vao = VertexArray::new(&context).unwrap();
        vao.set_vertex_buffer(triangle_pair()).unwrap();
        vao.set_index_buffer(IndexBuffer::new(vec![0, 1, 2])).unwrap();
        vao.init().unwrap();

        let calls = gl.calls();
        let position = |wanted: &GlCall| calls.iter().position(|call| call == wanted).unwrap();
        let bind_array = position(&GlCall::Bind(ResourceKind::VertexArray, vao.handle()));
        let vertices = position(&GlCall::UploadVertices(12));
        let indices = position(&GlCall::UploadIndices(3));

        assert!(bind_array < vertices && vertices < indices);
        assert_eq!(
            gl.count(|call| matches!(call, GlCall::AttributeEnabled { location: 0, enabled: true })),
            1
        );
        vao.dispose();
    }

    #[test]
    fn second_child_is_rejected() {
        let (_gl, context) = setup();
        let mut vao = VertexArray::new(&context).unwrap();
        vao.set_vertex_buffer(triangle_pair()).unwrap();
        vao.set_index_buffer(IndexBuffer::new(vec![0])).unwrap();

        let err = vao.set_vertex_buffer(triangle_pair()).unwrap_err();
        assert!(matches!(err, VizError::AlreadyInitialized { child: "vertex" }));
        let err = vao.set_index_buffer(IndexBuffer::new(vec![1])).unwrap_err();
        assert!(matches!(err, VizError::AlreadyInitialized { child: "index" }));
    }

    #[test]
    fn use_before_init_fails_fast() {
        let (_gl, context) = setup();
        let vao = VertexArray::new(&context).unwrap();

        assert!(matches!(vao.draw(), Err(VizError::UninitializedUse(_))));
        assert!(matches!(vao.bind(), Err(VizError::UninitializedUse(_))));
    }

    #[test]
    fn empty_array_draws_nothing() {
        let (gl, context) = setup();
        let mut vao = VertexArray::new(&context).unwrap();
        vao.init().unwrap();

        vao.draw().unwrap();
        assert!(gl.draw_calls().is_empty());
        vao.dispose();
    }

    #[test]
    fn double_dispose_deletes_once() {
        let (gl, context) = setup();
        let mut vao = VertexArray::new(&context).unwrap();
        vao.set_vertex_buffer(triangle_pair()).unwrap();
        vao.set_index_buffer(IndexBuffer::new(vec![0, 1, 2])).unwrap();
        vao.init().unwrap();
        let handle = vao.handle();

        vao.dispose();
        vao.dispose();

        assert_eq!(vao.state(), BufferState::Disposed);
        assert_eq!(gl.count(|call| *call == GlCall::Delete(ResourceKind::VertexArray, handle)), 1);
        assert_eq!(gl.count(|call| matches!(call, GlCall::Delete(ResourceKind::VertexBuffer, _))), 1);
        assert_eq!(gl.count(|call| matches!(call, GlCall::Delete(ResourceKind::IndexBuffer, _))), 1);
        assert!(vao.vertex_buffer().is_none());
        assert!(vao.index_buffer().is_none());
    }

    #[test]
    fn disposing_uninitialised_array_is_a_no_op() {
        let (gl, context) = setup();
        let mut vao = VertexArray::new(&context).unwrap();
        vao.dispose();

        assert_eq!(vao.state(), BufferState::Uninitialized);
        assert!(gl.calls().is_empty());
    }

    #[test]
    fn repeated_draws_bind_once() {
        let (gl, context) = setup();
        let mut vao = VertexArray::new(&context).unwrap();
        vao.set_vertex_buffer(triangle_pair()).unwrap();
        vao.init().unwrap();
        vao.unbind().unwrap();
        gl.clear();

        for _ in 0..3 {
            vao.draw().unwrap();
        }

        assert_eq!(gl.bind_calls(ResourceKind::VertexArray), vec![vao.handle()]);
        assert_eq!(gl.draw_calls().len(), 3);
        vao.dispose();
    }

    #[test]
    fn failed_bind_skips_the_draw() {
        let (gl, context) = setup();
        let mut vao = VertexArray::new(&context).unwrap();
        vao.set_vertex_buffer(triangle_pair()).unwrap();
        vao.init().unwrap();
        vao.unbind().unwrap();
        gl.fail_next_binds(ResourceKind::VertexArray, 1);

        vao.draw().unwrap();
        assert!(gl.draw_calls().is_empty());

        vao.draw().unwrap();
        assert_eq!(gl.draw_calls().len(), 1);
        vao.dispose();
    }

    #[test]
    fn late_child_is_uploaded_on_attach() {
        let (gl, context) = setup();
        let mut vao = VertexArray::new(&context).unwrap();
        vao.init().unwrap();

        vao.set_index_buffer(IndexBuffer::new(vec![0, 1, 2, 2, 1, 3])).unwrap();
        assert_eq!(gl.count(|call| *call == GlCall::UploadIndices(6)), 1);

        vao.draw().unwrap();
        assert_eq!(
            gl.draw_calls(),
            vec![GlCall::DrawElements { mode: DrawMode::Triangles, count: 6 }]
        );
        vao.dispose();
    }

    #[test]
    fn failed_init_rolls_back_and_can_be_retried() {
        let (gl, context) = setup();
        let mut vao = VertexArray::new(&context).unwrap();
        vao.set_vertex_buffer(triangle_pair()).unwrap();
        gl.fail_next_binds(ResourceKind::VertexArray, 1);

        assert!(matches!(vao.init(), Err(VizError::Binding(_))));
        assert_eq!(vao.state(), BufferState::Uninitialized);
        assert_eq!(vao.handle(), Handle::NONE);
        assert_eq!(gl.count(|call| matches!(call, GlCall::Delete(ResourceKind::VertexArray, _))), 1);
        assert!(matches!(vao.draw(), Err(VizError::UninitializedUse(_))));

        vao.init().unwrap();
        assert_eq!(vao.state(), BufferState::Initialized);
        assert_eq!(gl.count(|call| *call == GlCall::UploadVertices(12)), 1);
        vao.draw().unwrap();
        assert_eq!(gl.draw_calls().len(), 1);
        vao.dispose();
    }

    #[test]
    fn failed_child_bind_releases_the_array_handle() {
        let (gl, context) = setup();
        let mut vao = VertexArray::new(&context).unwrap();
        vao.set_vertex_buffer(triangle_pair()).unwrap();
        vao.set_index_buffer(IndexBuffer::new(vec![0, 1, 2])).unwrap();
        gl.fail_next_binds(ResourceKind::IndexBuffer, 1);

        assert!(vao.init().is_err());
        assert_eq!(vao.state(), BufferState::Uninitialized);
        assert_eq!(gl.count(|call| matches!(call, GlCall::Delete(ResourceKind::VertexArray, _))), 1);
        assert_eq!(gl.count(|call| matches!(call, GlCall::Delete(ResourceKind::VertexBuffer, _))), 1);
        assert_eq!(gl.count(|call| matches!(call, GlCall::Delete(ResourceKind::IndexBuffer, _))), 1);
        assert!(vao.vertex_buffer().is_some());
        assert!(vao.index_buffer().is_some());
    }

    #[test]
    fn failed_late_attach_leaves_the_slot_empty() {
        let (gl, context) = setup();
        let mut vao = VertexArray::new(&context).unwrap();
        vao.init().unwrap();
        vao.unbind().unwrap();
        gl.fail_next_binds(ResourceKind::VertexArray, 1);

        assert!(matches!(vao.set_vertex_buffer(triangle_pair()), Err(VizError::Binding(_))));
        assert!(vao.vertex_buffer().is_none());
        assert_eq!(gl.count(|call| matches!(call, GlCall::UploadVertices(_))), 0);

        vao.set_vertex_buffer(triangle_pair()).unwrap();
        assert_eq!(gl.count(|call| *call == GlCall::UploadVertices(12)), 1);
        vao.draw().unwrap();
        assert_eq!(
            gl.draw_calls(),
            vec![GlCall::DrawArrays { mode: DrawMode::Triangles, first: 0, count: 6 }]
        );
        vao.dispose();
    }

    #[test]
    fn rejects_misaligned_vertex_data() {
        assert!(VertexBuffer::positions(vec![0.0; 5], 2).is_err());
        assert!(VertexBuffer::new(vec![0.0; 4], Vec::new()).is_err());
    }
}
