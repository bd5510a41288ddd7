use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::Binder;
use crate::error::BindingError;
use crate::gl::{GraphicsApi, Handle, ResourceKind};

/// Tracks the single active resource of one kind.
///
/// Binding the handle that is already active issues no native call. Handle
/// equality is the whole identity test, so every kind must hand out handles
/// that are unique among its live resources.
pub struct ExclusivityGroup {
    kind: ResourceKind,
    binder: Box<dyn Binder>,
    gl: Arc<dyn GraphicsApi>,
    active: Mutex<Handle>,
}

impl ExclusivityGroup {
    pub(crate) fn new(kind: ResourceKind, binder: Box<dyn Binder>, gl: Arc<dyn GraphicsApi>) -> Self {
        Self {
            kind,
            binder,
            gl,
            active: Mutex::new(Handle::NONE),
        }
    }

    /// Returns the resource kind this group governs.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns the handle last activated, or [`Handle::NONE`].
    pub fn active(&self) -> Handle {
        *self.active.lock()
    }

    /// Makes `handle` the active resource of this kind.
    ///
    /// On failure the previously active handle stays recorded.
    pub fn bind(&self, handle: Handle) -> Result<ActiveBinding<'_>, BindingError> {
        let mut active = self.active.lock();
        if *active != handle {
            self.binder.bind(self.gl.as_ref(), handle)?;
            tracing::trace!(kind = ?self.kind, from = active.0, to = handle.0, "activated");
            *active = handle;
        }
        Ok(ActiveBinding { group: self, handle })
    }

    /// Deactivates `handle` and records the binder's default as active.
    ///
    /// The binder runs even if `handle` is not the active resource; only
    /// unbind what you bound.
    pub fn unbind(&self, handle: Handle) -> Result<(), BindingError> {
        let mut active = self.active.lock();
        let fallback = self.binder.unbind(self.gl.as_ref(), handle)?;
        tracing::trace!(kind = ?self.kind, from = active.0, to = fallback.0, "deactivated");
        *active = fallback;
        Ok(())
    }

    /// Binds `handle` for the duration of `f`.
    pub fn with_bound<T>(&self, handle: Handle, f: impl FnOnce() -> T) -> Result<T, BindingError> {
        let binding = self.bind(handle)?;
        let value = f();
        binding.release()?;
        Ok(value)
    }

    /// Drops `handle` from the active slot without a native call. Deleting a
    /// bound object implicitly rebinds the default, and handles may be reused
    /// by the driver afterwards.
    pub fn forget(&self, handle: Handle) {
        let mut active = self.active.lock();
        if *active == handle {
            *active = Handle::NONE;
        }
    }
}

impl fmt::Debug for ExclusivityGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusivityGroup")
            .field("kind", &self.kind)
            .field("binder", &self.binder)
            .field("active", &self.active())
            .finish()
    }
}

/// Proof that a handle was active in its group when `bind` returned.
///
/// Dropping the token does nothing; call [`ActiveBinding::release`] to unbind.
#[derive(Debug)]
pub struct ActiveBinding<'a> {
    group: &'a ExclusivityGroup,
    handle: Handle,
}

impl ActiveBinding<'_> {
    /// Returns the handle that was activated.
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Unbinds the handle through its group.
    pub fn release(self) -> Result<(), BindingError> {
        self.group.unbind(self.handle)
    }
}
