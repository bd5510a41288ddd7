//! Core library for the audio-reactive visualiser.
//!
//! The graphics context is single-threaded and its bindings are global
//! mutable state. This crate keeps that state consistent:
//!
//! - [`bind`] makes binding idempotent per resource and exclusive per kind.
//! - [`queue`] lets input, audio and timer threads hand work to the
//!   rendering thread, coalescing per-frame parameter updates.
//! - [`buffer`] owns vertex arrays and the buffers beneath them.
//!
//! Native calls are issued only through [`gl::GraphicsApi`];
//! [`gl::RecordingApi`] is a headless implementation that records them.

pub mod audio;
pub mod bind;
pub mod buffer;
pub mod config;
pub mod error;
pub mod gl;
pub mod input;
pub mod mapping;
pub mod queue;
pub mod render;
pub mod uniform;

pub use audio::{FeatureExtractor, FeatureFrame};
pub use bind::{
    ActiveBinding, Bindable, Binder, BinderTable, BindingContext, BoundResource, CapabilitySwitch,
    ExclusivityGroup, GroupMember,
};
pub use buffer::{BufferState, IndexBuffer, VertexArray, VertexBuffer};
pub use config::{AppConfig, AudioConfig, RenderConfig};
pub use error::{BindingError, Result, VizError};
pub use gl::{DrawMode, GraphicsApi, Handle, RecordingApi, ResourceKind};
pub use input::{Intent, KeyBindings, KeyTable};
pub use mapping::{MappingDescriptor, MappingMatrix, ParameterUpdate};
pub use queue::{DeferredActionQueue, DrainReport, QueueConfig};
pub use render::{FrameStats, Renderer, Scene};
pub use uniform::{Program, UniformBlock, UniformValue};
