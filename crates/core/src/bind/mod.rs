//! Binding discipline: idempotent per-resource state, per-kind exclusivity
//! and the registry that hands out the shared groups.

mod binder;
mod context;
mod group;
mod resource;

pub use binder::{
    Binder, BinderTable, BufferBinder, FramebufferBinder, ProgramBinder, TextureBinder,
    VertexArrayBinder,
};
pub use context::BindingContext;
pub use group::{ActiveBinding, ExclusivityGroup};
pub use resource::{Bindable, BoundResource, CapabilitySwitch, GroupMember};
