//! A configured stage: a module instance plus the environment it runs in.
use crate::module::{IoName, Module, ModuleIo};
use crate::resolve::ResolutionEnv;
use crate::value::ValueMap;

pub struct Stage {
    pub name: String,
    /// Module reference as written in the platform flow.
    pub module_ref: String,
    pub module: Box<dyn Module>,
    /// Values set for this stage alone, before resolution.
    pub value_overrides: ValueMap,
    /// Builtins and every value layer, with the stage's own blocks at their rank.
    pub env: ResolutionEnv,
}

impl Stage {
    pub fn io(&self) -> &ModuleIo {
        self.module.io()
    }

    pub fn takes(&self) -> &[IoName] {
        &self.io().takes
    }

    pub fn produces(&self) -> &[IoName] {
        &self.io().produces
    }

    pub fn values(&self) -> &[IoName] {
        &self.io().values
    }

    /// Description of a product, or a placeholder when the module has none.
    pub fn meta(&self, product: &str) -> &str {
        self.io().describe(product)
    }
}
