use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use super::{BufferTarget, Capability, DrawMode, GraphicsApi, Handle, ResourceKind, VertexAttribute};
use crate::{error::BindingError, uniform::UniformValue};

/// Native call captured by [`RecordingApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    Create(ResourceKind, Handle),
    Delete(ResourceKind, Handle),
    Bind(ResourceKind, Handle),
    UploadVertices(usize),
    UploadIndices(usize),
    VertexAttribute { location: u32, components: usize, stride: usize },
    AttributeEnabled { location: u32, enabled: bool },
    Capability { capability: Capability, enabled: bool },
    Uniform { location: i32, value: UniformValue },
    DrawArrays { mode: DrawMode, first: usize, count: usize },
    DrawElements { mode: DrawMode, count: usize },
}

/// Headless [`GraphicsApi`] that records every call instead of talking to a
/// driver. Handles are allocated from a single counter starting at 1.
#[derive(Debug)]
pub struct RecordingApi {
    calls: Mutex<Vec<GlCall>>,
    next_handle: AtomicU32,
    bind_failures: Mutex<HashMap<ResourceKind, usize>>,
    uniforms: Mutex<UniformTable>,
}

#[derive(Debug, Default)]
struct UniformTable {
    restricted: Option<HashSet<String>>,
    locations: HashMap<String, i32>,
}

impl Default for RecordingApi {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingApi {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_handle: AtomicU32::new(1),
            bind_failures: Mutex::new(HashMap::new()),
            uniforms: Mutex::new(UniformTable::default()),
        }
    }

    /// Limits the uniform names any program reports as active.
    pub fn with_uniforms<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uniforms.lock().restricted = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Makes the next `count` bind calls for `kind` fail.
    pub fn fail_next_binds(&self, kind: ResourceKind, count: usize) {
        self.bind_failures.lock().insert(kind, count);
    }

    pub fn calls(&self) -> Vec<GlCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn count(&self, predicate: impl Fn(&GlCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    /// Native bind calls issued for `kind`, including rebinds of the default.
    pub fn bind_calls(&self, kind: ResourceKind) -> Vec<Handle> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                GlCall::Bind(k, handle) if *k == kind => Some(*handle),
                _ => None,
            })
            .collect()
    }

    pub fn draw_calls(&self) -> Vec<GlCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, GlCall::DrawArrays { .. } | GlCall::DrawElements { .. }))
            .cloned()
            .collect()
    }

    fn record(&self, call: GlCall) {
        self.calls.lock().push(call);
    }

    fn bind(&self, kind: ResourceKind, handle: Handle) -> Result<(), BindingError> {
        {
            let mut failures = self.bind_failures.lock();
            if let Some(remaining) = failures.get_mut(&kind) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(BindingError::new(format!(
                        "injected failure binding {kind:?} {}",
                        handle.0
                    )));
                }
            }
        }
        self.record(GlCall::Bind(kind, handle));
        Ok(())
    }
}

impl GraphicsApi for RecordingApi {
    fn create(&self, kind: ResourceKind) -> Result<Handle, BindingError> {
        let handle = Handle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.record(GlCall::Create(kind, handle));
        Ok(handle)
    }

    fn delete(&self, kind: ResourceKind, handle: Handle) {
        self.record(GlCall::Delete(kind, handle));
    }

    fn bind_vertex_array(&self, handle: Handle) -> Result<(), BindingError> {
        self.bind(ResourceKind::VertexArray, handle)
    }

    fn bind_buffer(&self, target: BufferTarget, handle: Handle) -> Result<(), BindingError> {
        self.bind(target.kind(), handle)
    }

    fn bind_texture(&self, handle: Handle) -> Result<(), BindingError> {
        self.bind(ResourceKind::Texture, handle)
    }

    fn use_program(&self, handle: Handle) -> Result<(), BindingError> {
        self.bind(ResourceKind::Program, handle)
    }

    fn bind_framebuffer(&self, handle: Handle) -> Result<(), BindingError> {
        self.bind(ResourceKind::Framebuffer, handle)
    }

    fn upload_vertices(&self, data: &[f32]) -> Result<(), BindingError> {
        self.record(GlCall::UploadVertices(data.len()));
        Ok(())
    }

    fn upload_indices(&self, data: &[u32]) -> Result<(), BindingError> {
        self.record(GlCall::UploadIndices(data.len()));
        Ok(())
    }

    fn vertex_attribute(&self, attribute: VertexAttribute, stride: usize) {
        self.record(GlCall::VertexAttribute {
            location: attribute.location,
            components: attribute.components,
            stride,
        });
    }

    fn set_attribute_enabled(&self, location: u32, enabled: bool) -> Result<(), BindingError> {
        self.record(GlCall::AttributeEnabled { location, enabled });
        Ok(())
    }

    fn set_capability(&self, capability: Capability, enabled: bool) -> Result<(), BindingError> {
        self.record(GlCall::Capability { capability, enabled });
        Ok(())
    }

    fn uniform_location(&self, _program: Handle, name: &str) -> Option<i32> {
        let mut table = self.uniforms.lock();
        if let Some(restricted) = &table.restricted {
            if !restricted.contains(name) {
                return None;
            }
        }
        let next = table.locations.len() as i32;
        Some(*table.locations.entry(name.to_string()).or_insert(next))
    }

    fn set_uniform(&self, location: i32, value: &UniformValue) -> Result<(), BindingError> {
        self.record(GlCall::Uniform {
            location,
            value: value.clone(),
        });
        Ok(())
    }

    fn draw_arrays(&self, mode: DrawMode, first: usize, count: usize) {
        self.record(GlCall::DrawArrays { mode, first, count });
    }

    fn draw_elements(&self, mode: DrawMode, count: usize) {
        self.record(GlCall::DrawElements { mode, count });
    }
}
