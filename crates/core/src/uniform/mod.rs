//! Typed shader variables.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bind::{BindingContext, ExclusivityGroup};
use crate::error::BindingError;
use crate::gl::{GraphicsApi, Handle, ResourceKind};
use crate::{Result, VizError};

/// Value of a single uniform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    /// Column-major 4x4 matrix.
    Mat4([f32; 16]),
}

impl UniformValue {
    pub const IDENTITY: UniformValue = UniformValue::Mat4([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Writes the value to `location` of the program currently in use.
    pub fn apply(&self, gl: &dyn GraphicsApi, location: i32) -> std::result::Result<(), BindingError> {
        gl.set_uniform(location, self)
    }

    /// Returns the number of scalar components.
    pub fn components(&self) -> usize {
        match self {
            UniformValue::Float(_) | UniformValue::Int(_) | UniformValue::Bool(_) => 1,
            UniformValue::Vec2(_) => 2,
            UniformValue::Vec3(_) => 3,
            UniformValue::Vec4(_) => 4,
            UniformValue::Mat4(_) => 16,
        }
    }

    /// Scales every float component; integers and booleans pass through.
    pub fn scaled(&self, gain: f32) -> UniformValue {
        match self {
            UniformValue::Float(v) => UniformValue::Float(v * gain),
            UniformValue::Vec2(v) => UniformValue::Vec2(v.map(|c| c * gain)),
            UniformValue::Vec3(v) => UniformValue::Vec3(v.map(|c| c * gain)),
            UniformValue::Vec4(v) => UniformValue::Vec4(v.map(|c| c * gain)),
            UniformValue::Mat4(v) => UniformValue::Mat4(v.map(|c| c * gain)),
            other => other.clone(),
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

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        UniformValue::Bool(value)
    }
}

impl From<[f32; 2]> for UniformValue {
    fn from(value: [f32; 2]) -> Self {
        UniformValue::Vec2(value)
    }
}

impl From<[f32; 3]> for UniformValue {
    fn from(value: [f32; 3]) -> Self {
        UniformValue::Vec3(value)
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(value: [f32; 4]) -> Self {
        UniformValue::Vec4(value)
    }
}

/// A linked shader program and its active uniform locations.
///
/// Compilation and linking happen elsewhere; this only tracks the handle.
pub struct Program {
    handle: Handle,
    group: Arc<ExclusivityGroup>,
    gl: Arc<dyn GraphicsApi>,
    locations: HashMap<String, i32>,
}

impl Program {
    /// Allocates a program handle and resolves `uniforms` against it. Names
    /// the driver does not report are left out.
    pub fn create(context: &BindingContext, uniforms: &[&str]) -> Result<Self> {
        let group = context.exclusivity_group(ResourceKind::Program)?;
        let gl = context.gl().clone();
        let handle = gl.create(ResourceKind::Program)?;

        let locations = uniforms
            .iter()
            .filter_map(|name| {
                let location = gl.uniform_location(handle, name);
                if location.is_none() {
                    tracing::debug!(uniform = name, "uniform not active in program");
                }
                location.map(|location| (name.to_string(), location))
            })
            .collect();

        Ok(Self {
            handle,
            group,
            gl,
            locations,
        })
    }

    /// Returns the program handle, or [`Handle::NONE`] once disposed.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Names of the active uniforms, in no particular order.
    pub fn uniforms(&self) -> impl Iterator<Item = &str> {
        self.locations.keys().map(String::as_str)
    }

    /// Returns true if `name` resolved to a location at creation.
    pub fn has_uniform(&self, name: &str) -> bool {
        self.locations.contains_key(name)
    }

    /// Makes this program current.
    pub fn bind(&self) -> Result<()> {
        self.ensure_live()?;
        self.group.bind(self.handle)?;
        Ok(())
    }

    /// Makes the program current and writes `value`. Unknown names are
    /// ignored.
    pub fn set_uniform(&self, name: &str, value: &UniformValue) -> Result<()> {
        self.ensure_live()?;
        let Some(&location) = self.locations.get(name) else {
            tracing::debug!(uniform = name, "ignoring write to inactive uniform");
            return Ok(());
        };

        self.group.bind(self.handle)?;
        value.apply(self.gl.as_ref(), location)?;
        Ok(())
    }

    /// Deletes the program. Later use returns
    /// [`VizError::UninitializedUse`].
    pub fn dispose(&mut self) {
        if self.handle.is_none() {
            return;
        }
        self.group.forget(self.handle);
        self.gl.delete(ResourceKind::Program, self.handle);
        self.handle = Handle::NONE;
    }

    fn ensure_live(&self) -> Result<()> {
        if self.handle.is_none() {
            return Err(VizError::UninitializedUse("program"));
        }
        Ok(())
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("handle", &self.handle)
            .field("locations", &self.locations)
            .finish()
    }
}

/// Latest value per uniform name, flushed to a program once per frame.
#[derive(Debug, Default, Clone)]
pub struct UniformBlock {
    values: BTreeMap<String, UniformValue>,
    dirty: Vec<String>,
}

impl UniformBlock {
    /// Creates an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `value` for `name` and marks it for the next flush.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        let name = name.into();
        if !self.dirty.contains(&name) {
            self.dirty.push(name.clone());
        }
        self.values.insert(name, value.into());
    }

    /// Returns the latest value recorded for `name`.
    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.values.get(name)
    }

    /// Returns true if any value changed since the last flush.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Writes every value changed since the last flush and returns how many
    /// were written.
    pub fn flush(&mut self, program: &Program) -> Result<usize> {
        let dirty = std::mem::take(&mut self.dirty);
        for name in &dirty {
            if let Some(value) = self.values.get(name) {
                program.set_uniform(name, value)?;
            }
        }
        Ok(dirty.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gl::{GlCall, RecordingApi};

    fn setup(uniforms: &[&str]) -> (Arc<RecordingApi>, BindingContext) {
        let gl = Arc::new(RecordingApi::new().with_uniforms(uniforms.iter().copied()));
        let context = BindingContext::standard(gl.clone());
        (gl, context)
    }

    #[test]
    fn set_uniform_binds_program_once() {
        let (gl, context) = setup(&["intensity", "tint"]);
        let program = Program::create(&context, &["intensity", "tint"]).unwrap();

        program.set_uniform("intensity", &UniformValue::Float(0.5)).unwrap();
        program.set_uniform("tint", &UniformValue::Vec3([1.0, 0.0, 0.0])).unwrap();

        assert_eq!(gl.bind_calls(ResourceKind::Program), vec![program.handle()]);
        assert_eq!(
            gl.count(|call| matches!(call, GlCall::Uniform { .. })),
            2
        );
    }

    #[test]
    fn inactive_uniforms_are_ignored() {
        let (gl, context) = setup(&["intensity"]);
        let program = Program::create(&context, &["intensity", "missing"]).unwrap();

        assert!(!program.has_uniform("missing"));
        program.set_uniform("missing", &UniformValue::Int(3)).unwrap();
        assert_eq!(gl.count(|call| matches!(call, GlCall::Uniform { .. })), 0);
    }

    #[test]
    fn disposed_program_rejects_use() {
        let (gl, context) = setup(&[]);
        let mut program = Program::create(&context, &[]).unwrap();
        let handle = program.handle();
        program.bind().unwrap();

        program.dispose();
        program.dispose();

        assert!(matches!(program.bind(), Err(VizError::UninitializedUse(_))));
        assert_eq!(
            gl.count(|call| *call == GlCall::Delete(ResourceKind::Program, handle)),
            1
        );
        let group = context.exclusivity_group(ResourceKind::Program).unwrap();
        assert_eq!(group.active(), Handle::NONE);
    }

    #[test]
    fn block_flushes_only_changed_values() {
        let (gl, context) = setup(&["bass", "treble"]);
        let program = Program::create(&context, &["bass", "treble"]).unwrap();
        let mut block = UniformBlock::new();

        block.set("bass", 0.1_f32);
        block.set("bass", 0.7_f32);
        block.set("treble", 0.2_f32);
        assert_eq!(block.flush(&program).unwrap(), 2);
        assert!(!block.is_dirty());
        assert_eq!(block.flush(&program).unwrap(), 0);

        let written: Vec<_> = gl
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GlCall::Uniform { value, .. } => Some(value),
                _ => None,
            })
            .collect();
        assert_eq!(written, vec![UniformValue::Float(0.7), UniformValue::Float(0.2)]);
    }

    #[test]
    fn scaling_leaves_integers_alone() {
        assert_eq!(UniformValue::Float(2.0).scaled(0.5), UniformValue::Float(1.0));
        assert_eq!(UniformValue::Int(3).scaled(10.0), UniformValue::Int(3));
        assert_eq!(UniformValue::IDENTITY.components(), 16);
    }
}
