use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::ExclusivityGroup;
use crate::error::BindingError;
use crate::gl::{Capability, GraphicsApi, Handle};

/// Native bind/unbind implementation for a single resource.
pub trait Bindable {
    fn bind_impl(&self) -> Result<(), BindingError>;
    fn unbind_impl(&self) -> Result<(), BindingError>;
}

/// Gives any [`Bindable`] idempotent bind/unbind semantics.
///
/// Transitions on one instance are serialised by its own lock; separate
/// instances never contend. A failed native call is logged and leaves the
/// logical state where it was, so callers that care have to look at
/// [`BoundResource::is_bound`] afterwards.
pub struct BoundResource<R> {
    resource: R,
    bound: AtomicBool,
    transition: Mutex<()>,
}

impl<R: Bindable> BoundResource<R> {
    /// Wraps `resource` in the unbound state.
    pub fn new(resource: R) -> Self {
        Self {
            resource,
            bound: AtomicBool::new(false),
            transition: Mutex::new(()),
        }
    }

    /// Activates the resource unless it is already bound. A failed native
    /// call is logged and the resource stays unbound.
    pub fn bind(&self) {
        if self.bound.load(Ordering::Acquire) {
            return;
        }

        let _guard = self.transition.lock();
        if self.bound.load(Ordering::Acquire) {
            return;
        }

        match self.resource.bind_impl() {
            Ok(()) => self.bound.store(true, Ordering::Release),
            Err(err) => tracing::warn!(error = %err, "bind failed, resource left unbound"),
        }
    }

    /// Deactivates the resource if it is bound. A failed native call is
    /// logged and the resource stays bound.
    pub fn unbind(&self) {
        if !self.bound.load(Ordering::Acquire) {
            return;
        }

        let _guard = self.transition.lock();
        if !self.bound.load(Ordering::Acquire) {
            return;
        }

        match self.resource.unbind_impl() {
            Ok(()) => self.bound.store(false, Ordering::Release),
            Err(err) => tracing::warn!(error = %err, "unbind failed, resource left bound"),
        }
    }

    /// Advisory read of the logical state.
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Relaxed)
    }

    /// Returns the wrapped resource.
    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn into_inner(self) -> R {
        self.resource
    }
}

impl<R: fmt::Debug> fmt::Debug for BoundResource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundResource")
            .field("resource", &self.resource)
            .field("bound", &self.bound.load(Ordering::Relaxed))
            .finish()
    }
}

/// A handle whose activation is arbitrated by an [`ExclusivityGroup`].
///
/// Wrapped in a [`BoundResource`], the logical state only tracks this
/// member's own bind/unbind calls. Another member of the same group taking
/// over the binding is not reflected here, which is why the group's own
/// short-circuit is what draw paths rely on.
#[derive(Debug, Clone)]
pub struct GroupMember {
    handle: Handle,
    group: Arc<ExclusivityGroup>,
}

impl GroupMember {
    pub fn new(handle: Handle, group: Arc<ExclusivityGroup>) -> Self {
        Self { handle, group }
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn group(&self) -> &Arc<ExclusivityGroup> {
        &self.group
    }
}

impl Bindable for GroupMember {
    fn bind_impl(&self) -> Result<(), BindingError> {
        self.group.bind(self.handle).map(|_| ())
    }

    fn unbind_impl(&self) -> Result<(), BindingError> {
        self.group.unbind(self.handle)
    }
}

/// Enables a fixed-function capability while bound.
#[derive(Clone)]
pub struct CapabilitySwitch {
    gl: Arc<dyn GraphicsApi>,
    capability: Capability,
}

impl CapabilitySwitch {
    pub fn new(gl: Arc<dyn GraphicsApi>, capability: Capability) -> Self {
        Self { gl, capability }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }
}

impl Bindable for CapabilitySwitch {
    fn bind_impl(&self) -> Result<(), BindingError> {
        self.gl.set_capability(self.capability, true)
    }

    fn unbind_impl(&self) -> Result<(), BindingError> {
        self.gl.set_capability(self.capability, false)
    }
}

impl fmt::Debug for CapabilitySwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySwitch")
            .field("capability", &self.capability)
            .finish()
    }
}
