use crate::registry::{Named, Ref};

use super::{ComponentRef, ModelKind};

/// A handle to a registered [`Model`].
pub type ModelRef = Ref<ModelKind>;

/// A color model: a named, ordered group of components with a defined
/// semantic, e.g. `"RGBA"` or `"Y'CbCr"`.
///
/// Exactly one registered model may carry `is_reference`; it is the
/// canonical model the fishing planner routes all model-to-model legs
/// through when no more direct path is registered.
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    pub name: String,
    pub components: Vec<ComponentRef>,
    pub is_reference: bool,
}

impl Named for Model {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Model {
    pub fn new(name: impl Into<String>, components: Vec<ComponentRef>) -> Self {
        Model {
            name: name.into(),
            components,
            is_reference: false,
        }
    }

    pub fn reference(mut self) -> Self {
        self.is_reference = true;
        self
    }
}
