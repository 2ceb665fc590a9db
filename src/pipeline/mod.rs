//! Ordered composition of blocks sharing one context.
//!
//! A [`Pipeline`] is built from a list of primitive names. Each entry becomes
//! a [`Block`] named `{primitive}#{n}`, where `n` counts the occurrences of
//! that primitive so far. Blocks communicate only through the context: a
//! block reads its declared arguments from context variables and writes its
//! declared outputs back. Per-block `input_names` and `output_names` tables
//! rename those variables.
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use mlblocks::{Inputs, Pipeline, PrimitiveRegistry, RunOptions};
//!
//! let registry = Arc::new(PrimitiveRegistry::with_builtins()?);
//! let mut pipeline = Pipeline::new(
//!     [
//!         "mlblocks.preprocessing.StandardScaler",
//!         "mlblocks.linear_model.LogisticRegression",
//!     ],
//!     registry,
//! )?;
//!
//! pipeline.fit(Inputs::new().named("X", x_train).named("y", y_train), RunOptions::new())?;
//! let predictions = pipeline.predict(Inputs::new().named("X", x_test), RunOptions::new())?;
//! ```

mod options;
mod run;
mod template;

pub use options::{BlockRef, Inputs, OutputSelector, RunOptions, RunOutput};
pub use template::PipelineSpec;

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as Json;
use tracing::warn;

use crate::block::Block;
use crate::error::{Phase, PipelineError, Result};
use crate::hyperparameters::{HyperparameterView, Hyperparameters, TunableSpec};
use crate::primitive::{ArgSpec, PrimitiveResolver};

/// Per-block renaming of declared argument or output names to context
/// variable names.
pub type NameMap = IndexMap<String, IndexMap<String, String>>;

/// A context variable a pipeline consumes without producing it first.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineInput {
    pub name: String,
    pub type_name: Option<String>,
    /// False when a declared default or call-time value covers it.
    pub required: bool,
}

/// A context variable written by the last block.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub name: String,
    pub block: String,
    pub type_name: Option<String>,
}

/// Collects the pieces of a pipeline before the blocks are created.
pub struct PipelineBuilder {
    resolver: Arc<dyn PrimitiveResolver>,
    primitives: Vec<String>,
    init_params: IndexMap<String, Hyperparameters>,
    input_names: NameMap,
    output_names: NameMap,
}

impl PipelineBuilder {
    pub fn primitive(mut self, name: impl Into<String>) -> Self {
        self.primitives.push(name.into());
        self
    }

    pub fn primitives<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primitives.extend(names.into_iter().map(Into::into));
        self
    }

    /// Init params for a block, keyed by instance name (`name#2`) or by
    /// primitive name to apply to every instance without its own entry.
    pub fn init_params(mut self, key: impl Into<String>, params: Hyperparameters) -> Self {
        self.init_params.insert(key.into(), params);
        self
    }

    /// Read the declared argument `arg` of `block` from context variable
    /// `variable`.
    pub fn input_name(
        mut self,
        block: impl Into<String>,
        arg: impl Into<String>,
        variable: impl Into<String>,
    ) -> Self {
        self.input_names
            .entry(block.into())
            .or_default()
            .insert(arg.into(), variable.into());
        self
    }

    /// Store the declared output `output` of `block` as context variable
    /// `variable`.
    pub fn output_name(
        mut self,
        block: impl Into<String>,
        output: impl Into<String>,
        variable: impl Into<String>,
    ) -> Self {
        self.output_names
            .entry(block.into())
            .or_default()
            .insert(output.into(), variable.into());
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        Pipeline::assemble(
            self.resolver,
            self.primitives,
            self.init_params,
            self.input_names,
            self.output_names,
        )
    }
}

pub struct Pipeline {
    primitives: Vec<String>,
    init_params: IndexMap<String, Hyperparameters>,
    input_names: NameMap,
    output_names: NameMap,
    blocks: IndexMap<String, Block>,
    resolver: Arc<dyn PrimitiveResolver>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("primitives", &self.primitives)
            .field("blocks", &self.blocks.values().collect::<Vec<_>>())
            .field("input_names", &self.input_names)
            .field("output_names", &self.output_names)
            .finish()
    }
}

impl Pipeline {
    /// Build a pipeline from primitive names with no init params or remaps.
    pub fn new<I, S>(primitives: I, resolver: Arc<dyn PrimitiveResolver>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::builder(resolver).primitives(primitives).build()
    }

    pub fn builder(resolver: Arc<dyn PrimitiveResolver>) -> PipelineBuilder {
        PipelineBuilder {
            resolver,
            primitives: Vec::new(),
            init_params: IndexMap::new(),
            input_names: NameMap::new(),
            output_names: NameMap::new(),
        }
    }

    fn assemble(
        resolver: Arc<dyn PrimitiveResolver>,
        primitives: Vec<String>,
        init_params: IndexMap<String, Hyperparameters>,
        input_names: NameMap,
        output_names: NameMap,
    ) -> Result<Self> {
        if primitives.is_empty() {
            return Err(PipelineError::configuration(
                "a pipeline needs at least one primitive",
            ));
        }

        let empty = Hyperparameters::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut blocks = IndexMap::with_capacity(primitives.len());

        for primitive in &primitives {
            let count = counts.entry(primitive.as_str()).or_insert(0);
            *count += 1;
            let block_name = format!("{}#{}", primitive, count);

            let params = match init_params.get(&block_name) {
                Some(params) => params,
                None => match init_params.get(primitive) {
                    Some(params) => {
                        if *count > 1 {
                            warn!(
                                block = %block_name,
                                primitive = %primitive,
                                "non-numbered init params reused for another block of the same primitive"
                            );
                        }
                        params
                    }
                    None => &empty,
                },
            };

            let registered = resolver.resolve(primitive)?;
            let block = Block::new(block_name.clone(), registered, params)?;
            blocks.insert(block_name, block);
        }

        for key in init_params.keys() {
            if !blocks.contains_key(key) && !primitives.contains(key) {
                return Err(PipelineError::configuration(format!(
                    "init params given for unknown block '{}'",
                    key
                )));
            }
        }
        check_name_map(&blocks, &input_names, "input_names", |block, name| {
            block.descriptor().declares_arg(name)
        })?;
        check_name_map(&blocks, &output_names, "output_names", |block, name| {
            block.outputs().iter().any(|o| o.name == name)
        })?;

        Ok(Self {
            primitives,
            init_params,
            input_names,
            output_names,
            blocks,
            resolver,
        })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Primitive names, in declared order.
    pub fn primitives(&self) -> &[String] {
        &self.primitives
    }

    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.get(name)
    }

    pub fn resolver(&self) -> &Arc<dyn PrimitiveResolver> {
        &self.resolver
    }

    pub fn input_names(&self) -> &NameMap {
        &self.input_names
    }

    pub fn output_names(&self) -> &NameMap {
        &self.output_names
    }

    /// Current hyperparameter values of every block.
    pub fn get_hyperparameters(&self, flat: bool) -> HyperparameterView<Json> {
        let nested = self
            .blocks
            .iter()
            .map(|(name, block)| (name.clone(), block.get_hyperparameters()))
            .collect();
        HyperparameterView::from_nested(nested, flat)
    }

    /// Tunable metadata of every block, resolved against current values.
    pub fn get_tunable_hyperparameters(&self, flat: bool) -> HyperparameterView<TunableSpec> {
        let nested = self
            .blocks
            .iter()
            .map(|(name, block)| (name.clone(), block.get_tunable_hyperparameters()))
            .collect();
        HyperparameterView::from_nested(nested, flat)
    }

    /// Fan new values out to their blocks.
    ///
    /// Every block name is checked before any block changes. Each block
    /// applies its own values atomically, in pipeline order.
    pub fn set_hyperparameters(
        &mut self,
        values: impl Into<HyperparameterView<Json>>,
    ) -> Result<()> {
        let nested = values.into().into_nested();
        if let Some(unknown) = nested.keys().find(|name| !self.blocks.contains_key(*name)) {
            return Err(PipelineError::configuration(format!(
                "unknown block '{}'",
                unknown
            )));
        }
        for (name, block) in self.blocks.iter_mut() {
            if let Some(values) = nested.get(name) {
                block.set_hyperparameters(values)?;
            }
        }
        Ok(())
    }

    /// Context variables the pipeline needs from the caller.
    ///
    /// For fit this covers fit and produce arguments; for predict only
    /// produce arguments. Variables produced by an earlier block are
    /// excluded.
    pub fn get_inputs(&self, for_fit: bool) -> Vec<PipelineInput> {
        self.inputs_from(0, for_fit)
    }

    pub(crate) fn inputs_from(&self, start: usize, for_fit: bool) -> Vec<PipelineInput> {
        let mut inputs: Vec<PipelineInput> = Vec::new();
        let mut produced: Vec<String> = Vec::new();

        for (name, block) in self.blocks.iter().skip(start) {
            let remap = self.input_names.get(name);
            let fit_args: &[ArgSpec] = if for_fit { block.fit_args() } else { &[] };
            let phases = fit_args
                .iter()
                .map(|arg| (Phase::Fit, arg))
                .chain(block.produce_args().iter().map(|arg| (Phase::Produce, arg)));

            for (phase, arg) in phases {
                let variable = remap
                    .and_then(|m| m.get(&arg.name))
                    .cloned()
                    .unwrap_or_else(|| arg.name.clone());
                if produced.contains(&variable) || inputs.iter().any(|i| i.name == variable) {
                    continue;
                }
                inputs.push(PipelineInput {
                    required: arg.default.is_none() && !block.has_call_param(phase, &arg.name),
                    type_name: arg.type_name.clone(),
                    name: variable,
                });
            }

            for output in block.outputs() {
                produced.push(self.output_variable(name, &output.name));
            }
        }
        inputs
    }

    /// The last block's declared outputs, under their context names.
    pub fn get_outputs(&self) -> Vec<PipelineOutput> {
        let Some((name, block)) = self.blocks.last() else {
            return Vec::new();
        };
        block
            .outputs()
            .iter()
            .map(|output| PipelineOutput {
                name: self.output_variable(name, &output.name),
                block: name.clone(),
                type_name: output.type_name.clone(),
            })
            .collect()
    }

    /// Context variable name under which `block` stores `output`.
    pub(crate) fn output_variable(&self, block: &str, output: &str) -> String {
        self.output_names
            .get(block)
            .and_then(|m| m.get(output))
            .cloned()
            .unwrap_or_else(|| output.to_string())
    }
}

fn check_name_map(
    blocks: &IndexMap<String, Block>,
    names: &NameMap,
    table: &str,
    declares: impl Fn(&Block, &str) -> bool,
) -> Result<()> {
    for (block_name, entries) in names {
        let block = blocks.get(block_name).ok_or_else(|| {
            PipelineError::configuration(format!(
                "{} given for unknown block '{}'",
                table, block_name
            ))
        })?;
        if let Some(name) = entries.keys().find(|name| !declares(block, name.as_str())) {
            return Err(PipelineError::configuration(format!(
                "{} of '{}' renames undeclared name '{}'",
                table, block_name, name
            )));
        }
    }
    Ok(())
}
