use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{BinderTable, ExclusivityGroup};
use crate::gl::{GraphicsApi, ResourceKind};
use crate::{Result, VizError};

/// Registry of exclusivity groups, one per registered resource kind.
///
/// The set of kinds is fixed at construction. Every lookup for a kind returns
/// the same shared group, which is what makes exclusivity global rather than
/// per caller.
pub struct BindingContext {
    gl: Arc<dyn GraphicsApi>,
    groups: HashMap<ResourceKind, Arc<ExclusivityGroup>>,
}

impl BindingContext {
    /// Creates one exclusivity group per kind registered in `table`.
    pub fn new(gl: Arc<dyn GraphicsApi>, table: BinderTable) -> Self {
        let groups = table
            .into_entries()
            .map(|(kind, binder)| {
                let group = ExclusivityGroup::new(kind, binder, gl.clone());
                (kind, Arc::new(group))
            })
            .collect();

        Self { gl, groups }
    }

    /// Context with the standard binder for every kind.
    pub fn standard(gl: Arc<dyn GraphicsApi>) -> Self {
        Self::new(gl, BinderTable::standard())
    }

    /// Returns the shared group for `kind`, or
    /// [`VizError::UnknownKind`].
    pub fn exclusivity_group(&self, kind: ResourceKind) -> Result<Arc<ExclusivityGroup>> {
        self.groups
            .get(&kind)
            .cloned()
            .ok_or(VizError::UnknownKind(kind))
    }

    pub fn gl(&self) -> &Arc<dyn GraphicsApi> {
        &self.gl
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.groups.keys().copied()
    }
}

impl fmt::Debug for BindingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingContext")
            .field("groups", &self.groups.values().collect::<Vec<_>>())
            .finish()
    }
}
