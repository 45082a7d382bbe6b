use crate::registry::{Named, Ref};

use super::ComponentKind;

/// A handle to a registered [`Component`].
pub type ComponentRef = Ref<ComponentKind>;

/// A named channel, e.g. `"R"`, `"A"`, `"Y'"`.
#[derive(Clone, Debug, PartialEq)]
pub struct Component {
    pub name: String,
    pub is_alpha: bool,
    pub is_gamma: bool,
    pub is_chroma: bool,
}

impl Named for Component {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Component {
            name: name.into(),
            is_alpha: false,
            is_gamma: false,
            is_chroma: false,
        }
    }

    pub fn alpha(mut self) -> Self {
        self.is_alpha = true;
        self
    }

    pub fn gamma(mut self) -> Self {
        self.is_gamma = true;
        self
    }

    pub fn chroma(mut self) -> Self {
        self.is_chroma = true;
        self
    }
}
