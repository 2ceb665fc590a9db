//! Name-based lookup of primitives and pipeline templates.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use super::{
    Primitive, PrimitiveAdapter, PrimitiveDescriptor, PrimitiveFunction, RegisteredPrimitive,
};
use crate::error::{PipelineError, PrimitiveError, Result};
use crate::hyperparameters::Hyperparameters;
use crate::pipeline::PipelineSpec;
use crate::value::Value;

/// Resolves primitive names to registered primitives.
///
/// Pipelines hold a shared resolver so that copies and reloaded
/// configurations can construct fresh primitive instances.
pub trait PrimitiveResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<RegisteredPrimitive>>;

    /// A named pipeline configuration, if the resolver knows one.
    fn pipeline_template(&self, _name: &str) -> Option<PipelineSpec> {
        None
    }
}

/// In-memory resolver.
///
/// # Example
/// ```ignore
/// let mut registry = PrimitiveRegistry::with_builtins()?;
/// registry.register_function(descriptor, |args| Ok(vec![args.value("x")?.clone()]))?;
/// let registry = Arc::new(registry);
/// ```
#[derive(Debug, Default)]
pub struct PrimitiveRegistry {
    primitives: IndexMap<String, Arc<RegisteredPrimitive>>,
    templates: IndexMap<String, PipelineSpec>,
}

impl PrimitiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the crate's built-in primitives.
    pub fn with_builtins() -> Result<Self> {
        let mut registry = Self::new();
        crate::primitives::register_builtins(&mut registry)?;
        Ok(registry)
    }

    pub fn register_class<F>(&mut self, descriptor: PrimitiveDescriptor, constructor: F) -> Result<()>
    where
        F: Fn(&Hyperparameters) -> std::result::Result<Box<dyn Primitive>, PrimitiveError>
            + Send
            + Sync
            + 'static,
    {
        self.register(descriptor, PrimitiveAdapter::Class(Arc::new(constructor)))
    }

    pub fn register_function<F>(&mut self, descriptor: PrimitiveDescriptor, function: F) -> Result<()>
    where
        F: Fn(&super::Args) -> std::result::Result<Vec<Value>, PrimitiveError>
            + Send
            + Sync
            + 'static,
    {
        let function: PrimitiveFunction = Arc::new(function);
        self.register(descriptor, PrimitiveAdapter::Function(function))
    }

    /// Register a descriptor with its adapter after validating both.
    pub fn register(&mut self, descriptor: PrimitiveDescriptor, adapter: PrimitiveAdapter) -> Result<()> {
        descriptor.validate()?;

        if descriptor.kind != adapter.kind() {
            return Err(PipelineError::configuration(format!(
                "primitive '{}' is declared as {:?} but registered with a {:?} adapter",
                descriptor.name,
                descriptor.kind,
                adapter.kind()
            )));
        }
        if self.primitives.contains_key(&descriptor.name) {
            return Err(PipelineError::configuration(format!(
                "primitive '{}' is already registered",
                descriptor.name
            )));
        }

        debug!(primitive = %descriptor.name, kind = ?descriptor.kind, "registered primitive");
        let name = descriptor.name.clone();
        self.primitives
            .insert(name, Arc::new(RegisteredPrimitive::new(descriptor, adapter)));
        Ok(())
    }

    /// Store a named pipeline configuration; a later registration replaces it.
    pub fn register_template(&mut self, name: impl Into<String>, spec: PipelineSpec) {
        self.templates.insert(name.into(), spec);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.primitives.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.primitives.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }
}

impl PrimitiveResolver for PrimitiveRegistry {
    fn resolve(&self, name: &str) -> Result<Arc<RegisteredPrimitive>> {
        self.primitives
            .get(name)
            .cloned()
            .ok_or_else(|| PipelineError::configuration(format!("unknown primitive '{}'", name)))
    }

    fn pipeline_template(&self, name: &str) -> Option<PipelineSpec> {
        self.templates.get(name).cloned()
    }
}
