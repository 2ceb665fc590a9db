//! A single primitive instance inside a pipeline.
//!
//! A [`Block`] owns the current hyperparameter values of one primitive and,
//! for class primitives, the constructed object. It normalizes the
//! primitive's fit/produce signatures: the pipeline hands it a context and
//! gets back a map of declared output names to values.
//!
//! Init params are split three ways when the block is created:
//!
//! - names declared as fixed or tunable hyperparameters are construction
//!   values;
//! - names matching a declared fit or produce argument become call-time
//!   defaults for that argument;
//! - anything else is rejected as an unexpected hyperparameter.
//!
//! # Lifecycle
//! ```text
//! new() ──> Built ──fit()──> Fitted
//!             ^                 │
//!             └── construction-affecting set_hyperparameters()
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::context::Context;
use crate::error::{Phase, PipelineError, PrimitiveError, Result};
use crate::hyperparameters::{Hyperparameters, TunableSchema, TunableSpec};
use crate::primitive::{
    ArgSpec, Args, OutputSpec, Primitive, PrimitiveAdapter, PrimitiveDescriptor, PrimitiveKind,
    RegisteredPrimitive,
};
use crate::value::Value;

/// Observable state of a block's underlying object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Constructed and ready; a primitive with a fit phase still needs fitting.
    Built,
    /// `fit` completed since the last construction.
    Fitted,
}

pub struct Block {
    name: String,
    primitive: Arc<RegisteredPrimitive>,
    /// Construction values for fixed and tunable hyperparameters.
    hyperparameters: Hyperparameters,
    fit_params: Hyperparameters,
    produce_params: Hyperparameters,
    /// Tunable metadata exposed for search. Pinned parameters are absent.
    tunable: TunableSchema,
    instance: Option<Box<dyn Primitive>>,
    status: BlockStatus,
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("name", &self.name)
            .field("primitive", &self.primitive.name())
            .field("hyperparameters", &self.hyperparameters)
            .field("status", &self.status)
            .finish()
    }
}

impl Block {
    /// Create a block and construct its underlying object.
    pub fn new(
        name: impl Into<String>,
        primitive: Arc<RegisteredPrimitive>,
        init_params: &Hyperparameters,
    ) -> Result<Self> {
        let name = name.into();
        let descriptor = primitive.descriptor();
        let schema = &descriptor.hyperparameters;

        let mut fit_params = Hyperparameters::new();
        let mut produce_params = Hyperparameters::new();
        for (key, value) in init_params {
            if schema.declares(key) {
                continue;
            }
            let in_fit = declares(descriptor.fit_args(), key);
            let in_produce = declares(descriptor.produce_args(), key);
            if !in_fit && !in_produce {
                return Err(PipelineError::hyperparameter(
                    &name,
                    format!("unexpected hyperparameter '{}'", key),
                ));
            }
            if in_fit {
                fit_params.insert(key.clone(), value.clone());
            }
            if in_produce {
                produce_params.insert(key.clone(), value.clone());
            }
        }

        let mut hyperparameters = Hyperparameters::new();
        for (key, spec) in &schema.fixed {
            let value = match init_params.get(key) {
                Some(value) => value.clone(),
                None => spec.default.clone().ok_or_else(|| {
                    PipelineError::hyperparameter(
                        &name,
                        format!("required fixed hyperparameter '{}' is missing", key),
                    )
                })?,
            };
            hyperparameters.insert(key.clone(), value);
        }
        for key in schema.tunable.keys() {
            if let Some(value) = init_params.get(key) {
                hyperparameters.insert(key.clone(), value.clone());
            }
        }

        let tunable: TunableSchema = schema
            .tunable
            .iter()
            .filter(|(key, _)| !init_params.contains_key(*key))
            .map(|(key, spec)| (key.clone(), spec.clone()))
            .collect();

        let mut block = Self {
            name,
            primitive,
            hyperparameters: Hyperparameters::new(),
            fit_params,
            produce_params,
            tunable,
            instance: None,
            status: BlockStatus::Built,
        };

        fill_tunable_defaults(
            &mut hyperparameters,
            &block.primitive.descriptor().hyperparameters.tunable,
        );
        block.validate(&hyperparameters)?;
        block.instance = block.construct(&hyperparameters)?;
        block.hyperparameters = hyperparameters;

        debug!(block = %block.name, primitive = %block.primitive.name(), "created block");
        Ok(block)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primitive_name(&self) -> &str {
        self.primitive.name()
    }

    pub fn descriptor(&self) -> &PrimitiveDescriptor {
        self.primitive.descriptor()
    }

    pub fn kind(&self) -> PrimitiveKind {
        self.descriptor().kind
    }

    pub fn status(&self) -> BlockStatus {
        self.status
    }

    pub fn is_fitted(&self) -> bool {
        self.status == BlockStatus::Fitted
    }

    pub fn fit_args(&self) -> &[ArgSpec] {
        self.descriptor().fit_args()
    }

    pub fn produce_args(&self) -> &[ArgSpec] {
        self.descriptor().produce_args()
    }

    pub fn outputs(&self) -> &[OutputSpec] {
        self.descriptor().outputs()
    }

    /// Whether a call-time default is stored for the named argument.
    pub(crate) fn has_call_param(&self, phase: Phase, arg: &str) -> bool {
        match phase {
            Phase::Fit => self.fit_params.contains_key(arg),
            _ => self.produce_params.contains_key(arg),
        }
    }

    /// Current hyperparameter values.
    ///
    /// Inactive conditional hyperparameters are omitted. Call-time argument
    /// defaults supplied through init params follow the construction values.
    pub fn get_hyperparameters(&self) -> Hyperparameters {
        let mut values = self.active(&self.hyperparameters);
        for (key, value) in self.fit_params.iter().chain(&self.produce_params) {
            values.entry(key.clone()).or_insert_with(|| value.clone());
        }
        values
    }

    /// Tunable metadata resolved against the current values.
    pub fn get_tunable_hyperparameters(&self) -> TunableSchema {
        self.tunable
            .iter()
            .filter_map(|(key, spec)| {
                spec.resolve(&self.hyperparameters)
                    .map(|resolved| (key.clone(), resolved))
            })
            .collect()
    }

    /// Unresolved tunable metadata, as stored in a pipeline configuration.
    pub fn tunable_schema(&self) -> &TunableSchema {
        &self.tunable
    }

    /// Replace the tunable metadata, e.g. with narrowed ranges.
    pub fn set_tunable_schema(&mut self, tunable: TunableSchema) {
        self.tunable = tunable;
    }

    /// Merge new values into the current ones.
    ///
    /// A change to a fixed or tunable hyperparameter of a class primitive
    /// reconstructs the underlying object, which returns the block to
    /// [`BlockStatus::Built`]. Call-time argument defaults never force a
    /// rebuild. Nothing changes if any value is rejected.
    pub fn set_hyperparameters(&mut self, values: &Hyperparameters) -> Result<()> {
        let descriptor = self.primitive.descriptor();
        let schema = &descriptor.hyperparameters;

        let mut hyperparameters = self.hyperparameters.clone();
        let mut fit_params = self.fit_params.clone();
        let mut produce_params = self.produce_params.clone();

        for (key, value) in values {
            if schema.declares(key) {
                hyperparameters.insert(key.clone(), value.clone());
                continue;
            }
            let in_fit = declares(descriptor.fit_args(), key);
            let in_produce = declares(descriptor.produce_args(), key);
            if !in_fit && !in_produce {
                return Err(PipelineError::hyperparameter(
                    &self.name,
                    format!("unknown hyperparameter '{}'", key),
                ));
            }
            if in_fit {
                fit_params.insert(key.clone(), value.clone());
            }
            if in_produce {
                produce_params.insert(key.clone(), value.clone());
            }
        }

        fill_tunable_defaults(&mut hyperparameters, &schema.tunable);
        self.validate(&hyperparameters)?;

        // Inactive conditionals never reach the constructor.
        let changed = self.active(&hyperparameters) != self.active(&self.hyperparameters);
        if changed && self.kind() == PrimitiveKind::Class {
            let instance = self.construct(&hyperparameters)?;
            self.instance = instance;
            if self.status == BlockStatus::Fitted {
                debug!(block = %self.name, "rebuilt block; fitted state discarded");
            }
            self.status = BlockStatus::Built;
        }

        self.hyperparameters = hyperparameters;
        self.fit_params = fit_params;
        self.produce_params = produce_params;
        Ok(())
    }

    /// A fresh, unfitted copy of this block with the same configuration.
    pub fn rebuild(&self) -> Result<Block> {
        Ok(Block {
            name: self.name.clone(),
            primitive: Arc::clone(&self.primitive),
            hyperparameters: self.hyperparameters.clone(),
            fit_params: self.fit_params.clone(),
            produce_params: self.produce_params.clone(),
            tunable: self.tunable.clone(),
            instance: self.construct(&self.hyperparameters)?,
            status: BlockStatus::Built,
        })
    }

    /// Resolve the declared arguments of `phase` from the context.
    ///
    /// Each argument is looked up under its remapped variable name, then in
    /// the call-time defaults from init params, then in its declared default.
    pub fn bind_args(
        &self,
        phase: Phase,
        context: &Context,
        input_names: Option<&IndexMap<String, String>>,
    ) -> Result<Args> {
        let (specs, params) = match phase {
            Phase::Fit => (self.fit_args(), &self.fit_params),
            _ => (self.produce_args(), &self.produce_params),
        };

        let mut args = Args::new();
        for spec in specs {
            let variable = input_names
                .and_then(|names| names.get(&spec.name))
                .map(String::as_str)
                .unwrap_or(&spec.name);

            let value = if let Some(value) = context.get(variable) {
                value.clone()
            } else if let Some(value) = params.get(&spec.name) {
                Value::from_json(value)
            } else if let Some(default) = &spec.default {
                Value::from_json(default)
            } else {
                return Err(PipelineError::binding(
                    &self.name,
                    format!(
                        "required {} argument '{}' not found in context as '{}'",
                        phase, spec.name, variable
                    ),
                ));
            };

            if let Some(declared) = &spec.type_name {
                if !value.matches_type(declared) {
                    return Err(PipelineError::binding(
                        &self.name,
                        format!(
                            "{} argument '{}' is {}, declared as {}",
                            phase,
                            spec.name,
                            value.kind(),
                            declared
                        ),
                    ));
                }
            }
            args.insert(spec.keyword(), value);
        }
        Ok(args)
    }

    /// Run the fit phase. Blocks without one are left untouched.
    pub fn fit(&mut self, args: &Args) -> Result<()> {
        if self.descriptor().fit.is_none() {
            return Ok(());
        }
        if let Some(instance) = self.instance.as_mut() {
            instance
                .fit(args)
                .map_err(|source| PipelineError::execution(&self.name, Phase::Fit, source))?;
            self.status = BlockStatus::Fitted;
        }
        Ok(())
    }

    /// Run the produce phase, returning outputs keyed by declared name.
    pub fn produce(&self, args: Args) -> Result<IndexMap<String, Value>> {
        let outputs = match self.primitive.adapter() {
            PrimitiveAdapter::Class(_) => {
                if self.descriptor().requires_fit() && self.status != BlockStatus::Fitted {
                    return Err(PipelineError::NotFitted {
                        block: self.name.clone(),
                    });
                }
                let instance = self.instance.as_ref().ok_or_else(|| PipelineError::NotFitted {
                    block: self.name.clone(),
                })?;
                instance.produce(&args)
            }
            PrimitiveAdapter::Function(function) => {
                let mut args = args;
                for (key, value) in self.active(&self.hyperparameters) {
                    args.insert(key, Value::from_json(&value));
                }
                function(&args)
            }
        }
        .map_err(|source| PipelineError::execution(&self.name, Phase::Produce, source))?;

        let declared = self.outputs();
        if outputs.len() != declared.len() {
            return Err(PipelineError::execution(
                &self.name,
                Phase::Produce,
                PrimitiveError::InvalidShape {
                    expected: format!("{} outputs", declared.len()),
                    got: format!("{} outputs", outputs.len()),
                },
            ));
        }
        Ok(declared
            .iter()
            .map(|spec| spec.name.clone())
            .zip(outputs)
            .collect())
    }

    fn construct(&self, hyperparameters: &Hyperparameters) -> Result<Option<Box<dyn Primitive>>> {
        match self.primitive.adapter() {
            PrimitiveAdapter::Class(constructor) => constructor(&self.active(hyperparameters))
                .map(Some)
                .map_err(|source| PipelineError::execution(&self.name, Phase::Build, source)),
            PrimitiveAdapter::Function(_) => Ok(None),
        }
    }

    /// Schema used to validate `key`: narrowed metadata first, then the
    /// descriptor's own declaration.
    fn spec_for(&self, key: &str) -> Option<&TunableSpec> {
        self.tunable
            .get(key)
            .or_else(|| self.descriptor().hyperparameters.tunable.get(key))
    }

    /// Values with inactive conditional hyperparameters removed.
    fn active(&self, values: &Hyperparameters) -> Hyperparameters {
        values
            .iter()
            .filter(|(key, _)| match self.spec_for(key) {
                Some(spec) if spec.condition().is_some() => spec.resolve(values).is_some(),
                _ => true,
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    fn validate(&self, values: &Hyperparameters) -> Result<()> {
        for (key, value) in values {
            let Some(spec) = self.spec_for(key) else {
                continue;
            };
            let Some(resolved) = spec.resolve(values) else {
                continue;
            };
            resolved.check(value).map_err(|message| {
                PipelineError::hyperparameter(&self.name, format!("'{}': {}", key, message))
            })?;
        }
        Ok(())
    }
}

fn declares(args: &[ArgSpec], key: &str) -> bool {
    args.iter().any(|arg| arg.name == key)
}

/// Insert defaults for tunable hyperparameters without a value, resolving
/// conditionals after the plain ones they may depend on.
fn fill_tunable_defaults(values: &mut Hyperparameters, tunable: &TunableSchema) {
    let (conditional, plain): (Vec<_>, Vec<_>) = tunable
        .iter()
        .partition(|(_, spec)| spec.condition().is_some());

    for (key, spec) in plain.into_iter().chain(conditional) {
        if values.contains_key(key) {
            continue;
        }
        if let Some(default) = spec.resolve(values).and_then(|s| s.default_value()) {
            values.insert(key.clone(), default);
        }
    }
}
