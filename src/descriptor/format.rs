use crate::registry::{Named, Ref};

use super::{ComponentRef, FormatKind, ModelRef, TypeRef};

/// A handle to a registered [`Format`].
pub type FormatRef = Ref<FormatKind>;

/// Whether the components of a [`Format`] are interleaved into a single
/// buffer or split one-plane-per-component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    Interleaved,
    Planar,
}

/// A concrete pixel layout: a model, a storage type, an ordered component
/// list, and the layout and stride that follow from those.
///
/// `components` must be a permutation of `model`'s own component list — same
/// components, any order, no channel added or dropped. Construction rejects
/// any other component list (registration time, not plan time), since the
/// fishing planner's reference decomposition reorders components without
/// inserting or discarding any.
///
/// Exactly one registered format may carry `is_reference`; its model and
/// type must themselves be the reference model and reference type.
#[derive(Clone, Debug, PartialEq)]
pub struct Format {
    pub name: String,
    pub model: ModelRef,
    pub ty: TypeRef,
    pub components: Vec<ComponentRef>,
    pub layout: Layout,
    pub bytes_per_pixel: u32,
    pub is_reference: bool,
}

impl Named for Format {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Format {
    pub fn is_planar(&self) -> bool {
        self.layout == Layout::Planar
    }
}
