//! Fit and predict traversal.
//!
//! Both phases walk the blocks in declared order from the `start` block
//! through the block selected by `output`. Arguments of a block are bound
//! before anything runs for it, so binding errors leave the context as the
//! previous block left it. An execution failure aborts the run immediately;
//! the context keeps whatever earlier blocks wrote.

use indexmap::IndexMap;
use tracing::{debug, error};

use super::options::{BlockRef, Inputs, OutputSelector, RunOptions, RunOutput};
use super::Pipeline;
use crate::context::Context;
use crate::error::{Phase, PipelineError, Result};
use crate::value::Value;

/// Resolved block range and return selection of one run.
#[derive(Debug, Clone, PartialEq)]
struct Plan {
    start: usize,
    stop: usize,
    selection: Selection,
}

#[derive(Debug, Clone, PartialEq)]
enum Selection {
    /// Whole context for fit, last block's outputs for predict.
    Default,
    Context,
    Variable(String),
    Variables(Vec<String>),
}

impl Pipeline {
    /// Fit every selected block, producing its outputs for the blocks after
    /// it.
    ///
    /// Returns the whole context unless `options.output` selects otherwise.
    pub fn fit(&mut self, inputs: impl Into<Inputs>, options: RunOptions) -> Result<RunOutput> {
        let plan = self.plan(&options)?;
        let mut context = self.seed(inputs.into(), plan.start, true)?;
        self.fit_blocks(&mut context, &plan)?;
        self.select(context, &plan, true)
    }

    /// Run the produce phase of every selected block.
    ///
    /// Returns the last block's output (or outputs, if it declares several)
    /// unless `options.output` selects otherwise.
    pub fn predict(&self, inputs: impl Into<Inputs>, options: RunOptions) -> Result<RunOutput> {
        let plan = self.plan(&options)?;
        let mut context = self.seed(inputs.into(), plan.start, false)?;
        self.predict_blocks(&mut context, &plan)?;
        self.select(context, &plan, false)
    }

    /// Like [`fit`](Self::fit), but reads from and writes into a caller-owned
    /// context, which stays inspectable if a block fails.
    pub fn fit_context(&mut self, context: &mut Context, options: RunOptions) -> Result<RunOutput> {
        let plan = self.plan(&options)?;
        self.fit_blocks(context, &plan)?;
        self.select(context.clone(), &plan, true)
    }

    /// Like [`predict`](Self::predict), on a caller-owned context.
    pub fn predict_context(&self, context: &mut Context, options: RunOptions) -> Result<RunOutput> {
        let plan = self.plan(&options)?;
        self.predict_blocks(context, &plan)?;
        self.select(context.clone(), &plan, false)
    }

    fn fit_blocks(&mut self, context: &mut Context, plan: &Plan) -> Result<()> {
        for (index, (name, block)) in self.blocks.iter_mut().enumerate() {
            if index < plan.start {
                debug!(block = %name, "skipping block");
                continue;
            }
            if index > plan.stop {
                break;
            }

            let remap = self.input_names.get(name);
            let fit_args = block
                .bind_args(Phase::Fit, context, remap)
                .inspect_err(|err| report(name, Phase::Fit, err))?;
            let produce_args = block
                .bind_args(Phase::Produce, context, remap)
                .inspect_err(|err| report(name, Phase::Produce, err))?;

            debug!(block = %name, "fitting block");
            block
                .fit(&fit_args)
                .inspect_err(|err| report(name, Phase::Fit, err))?;

            debug!(block = %name, "producing block");
            let outputs = block
                .produce(produce_args)
                .inspect_err(|err| report(name, Phase::Produce, err))?;
            store_outputs(context, self.output_names.get(name), outputs);
        }
        Ok(())
    }

    fn predict_blocks(&self, context: &mut Context, plan: &Plan) -> Result<()> {
        for (index, (name, block)) in self.blocks.iter().enumerate() {
            if index < plan.start {
                debug!(block = %name, "skipping block");
                continue;
            }
            if index > plan.stop {
                break;
            }

            let args = block
                .bind_args(Phase::Produce, context, self.input_names.get(name))
                .inspect_err(|err| report(name, Phase::Produce, err))?;

            debug!(block = %name, "producing block");
            let outputs = block
                .produce(args)
                .inspect_err(|err| report(name, Phase::Produce, err))?;
            store_outputs(context, self.output_names.get(name), outputs);
        }
        Ok(())
    }

    /// Build the initial context from positional and named inputs.
    fn seed(&self, inputs: Inputs, start: usize, for_fit: bool) -> Result<Context> {
        let mut context = Context::new();

        if !inputs.positional.is_empty() {
            let names = self.inputs_from(start, for_fit);
            if inputs.positional.len() > names.len() {
                let block = self
                    .blocks
                    .get_index(start)
                    .map(|(name, _)| name.clone())
                    .unwrap_or_default();
                return Err(PipelineError::binding(
                    block,
                    format!(
                        "{} positional inputs given but the pipeline takes {} ({:?})",
                        inputs.positional.len(),
                        names.len(),
                        names.iter().map(|i| i.name.as_str()).collect::<Vec<_>>()
                    ),
                ));
            }
            for (input, value) in names.into_iter().zip(inputs.positional) {
                context.insert(input.name, value);
            }
        }

        context.extend(inputs.named);
        Ok(context)
    }

    fn plan(&self, options: &RunOptions) -> Result<Plan> {
        let last = self.blocks.len().saturating_sub(1);
        let start = match &options.start {
            None => 0,
            Some(reference) => self.block_index(reference)?,
        };

        let (stop, selection) = match &options.output {
            None => (last, Selection::Default),
            Some(OutputSelector::Index(index)) => {
                (self.block_index(&BlockRef::Index(*index))?, Selection::Context)
            }
            Some(OutputSelector::Name(name)) => self.parse_output(name)?,
            Some(OutputSelector::Names(names)) => {
                if names.is_empty() {
                    return Err(PipelineError::configuration("output list is empty"));
                }
                let mut stop = 0;
                let mut variables = Vec::with_capacity(names.len());
                for name in names {
                    let (index, variable) = self.parse_variable(name)?;
                    stop = index;
                    variables.push(variable);
                }
                (stop, Selection::Variables(variables))
            }
        };

        if start > stop {
            return Err(PipelineError::configuration(format!(
                "start block {} comes after output block {}",
                start, stop
            )));
        }
        Ok(Plan {
            start,
            stop,
            selection,
        })
    }

    fn block_index(&self, reference: &BlockRef) -> Result<usize> {
        match reference {
            BlockRef::Index(index) if *index < self.blocks.len() => Ok(*index),
            BlockRef::Index(index) => Err(PipelineError::configuration(format!(
                "block index {} is out of range for {} blocks",
                index,
                self.blocks.len()
            ))),
            BlockRef::Name(name) => self
                .blocks
                .get_index_of(name)
                .ok_or_else(|| PipelineError::configuration(format!("unknown block '{}'", name))),
        }
    }

    /// A block name, or `block.variable`.
    fn parse_output(&self, name: &str) -> Result<(usize, Selection)> {
        if let Some(index) = self.blocks.get_index_of(name) {
            return Ok((index, Selection::Context));
        }
        let (index, variable) = self.parse_variable(name)?;
        Ok((index, Selection::Variable(variable)))
    }

    fn parse_variable(&self, name: &str) -> Result<(usize, String)> {
        name.rsplit_once('.')
            .and_then(|(block, variable)| {
                self.blocks
                    .get_index_of(block)
                    .map(|index| (index, variable.to_string()))
            })
            .ok_or_else(|| {
                PipelineError::configuration(format!(
                    "output '{}' is neither a block name nor of the form 'block.variable'",
                    name
                ))
            })
    }

    fn select(&self, mut context: Context, plan: &Plan, for_fit: bool) -> Result<RunOutput> {
        match &plan.selection {
            Selection::Default if for_fit => Ok(RunOutput::Context(context)),
            Selection::Context => Ok(RunOutput::Context(context)),
            Selection::Default => {
                let mut values = self
                    .get_outputs()
                    .into_iter()
                    .map(|output| take(&mut context, &output.name))
                    .collect::<Result<Vec<_>>>()?;
                if values.len() == 1 {
                    Ok(RunOutput::Value(values.remove(0)))
                } else {
                    Ok(RunOutput::Values(values))
                }
            }
            Selection::Variable(variable) => take(&mut context, variable).map(RunOutput::Value),
            Selection::Variables(variables) => variables
                .iter()
                .map(|variable| {
                    context.get(variable).cloned().ok_or_else(|| missing(variable))
                })
                .collect::<Result<Vec<_>>>()
                .map(RunOutput::Values),
        }
    }
}

fn store_outputs(
    context: &mut Context,
    remap: Option<&IndexMap<String, String>>,
    outputs: IndexMap<String, Value>,
) {
    for (declared, value) in outputs {
        let variable = remap
            .and_then(|m| m.get(&declared))
            .cloned()
            .unwrap_or(declared);
        context.insert(variable, value);
    }
}

fn take(context: &mut Context, variable: &str) -> Result<Value> {
    context.remove(variable).ok_or_else(|| missing(variable))
}

fn missing(variable: &str) -> PipelineError {
    PipelineError::configuration(format!(
        "output variable '{}' not found in context",
        variable
    ))
}

fn report(block: &str, phase: Phase, err: &PipelineError) {
    error!(block = %block, phase = %phase, error = %err, "block failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::hyperparameters::Hyperparameters;
    use crate::primitive::{PrimitiveRegistry, PrimitiveResolver};
    use crate::primitives::math::ADD;
    use serde_json::json;

    fn chain() -> Pipeline {
        let registry: Arc<dyn PrimitiveResolver> =
            Arc::new(PrimitiveRegistry::with_builtins().unwrap());
        let offset = |b: i64| -> Hyperparameters {
            [("b".to_string(), json!(b))].into_iter().collect()
        };
        Pipeline::builder(registry)
            .primitives([ADD, ADD, ADD])
            .init_params("mlblocks.math.add#1", offset(1))
            .init_params("mlblocks.math.add#2", offset(10))
            .init_params("mlblocks.math.add#3", offset(100))
            .input_name("mlblocks.math.add#2", "a", "out")
            .input_name("mlblocks.math.add#3", "a", "out")
            .build()
            .unwrap()
    }

    #[test]
    fn test_plan_defaults() {
        let pipeline = chain();
        let plan = pipeline.plan(&RunOptions::new()).unwrap();
        assert_eq!(
            plan,
            Plan {
                start: 0,
                stop: 2,
                selection: Selection::Default
            }
        );
    }

    #[test]
    fn test_plan_selectors() {
        let pipeline = chain();

        let plan = pipeline
            .plan(&RunOptions::new().with_output("mlblocks.math.add#2"))
            .unwrap();
        assert_eq!((plan.stop, plan.selection), (1, Selection::Context));

        let plan = pipeline
            .plan(&RunOptions::new().with_output("mlblocks.math.add#1.out"))
            .unwrap();
        assert_eq!(
            (plan.stop, plan.selection),
            (0, Selection::Variable("out".to_string()))
        );

        let plan = pipeline
            .plan(
                &RunOptions::new()
                    .with_start("mlblocks.math.add#2")
                    .with_output(vec!["mlblocks.math.add#3.out", "mlblocks.math.add#2.a"]),
            )
            .unwrap();
        assert_eq!(plan.start, 1);
        assert_eq!(plan.stop, 1);
    }

    #[test]
    fn test_plan_rejects_bad_selectors() {
        let pipeline = chain();
        for options in [
            RunOptions::new().with_output(3usize),
            RunOptions::new().with_output("nope"),
            RunOptions::new().with_output("nope#1.out"),
            RunOptions::new().with_start("nope#1"),
            RunOptions::new().with_start(2usize).with_output(1usize),
            RunOptions::new().with_output(Vec::<String>::new()),
            RunOptions::new().with_output(vec!["mlblocks.math.add#1"]),
        ] {
            assert!(
                matches!(
                    pipeline.plan(&options),
                    Err(PipelineError::Configuration { .. })
                ),
                "options {:?} should be rejected",
                options
            );
        }
    }

    #[test]
    fn test_predict_threads_context() {
        let pipeline = chain();
        let out = pipeline
            .predict(Inputs::new().named("a", 1i64), RunOptions::new())
            .unwrap();
        assert_eq!(out, RunOutput::Value(Value::Int(112)));
    }

    #[test]
    fn test_positional_inputs() {
        let pipeline = chain();
        let out = pipeline
            .predict(Inputs::new().arg(5i64), RunOptions::new())
            .unwrap();
        assert_eq!(out.into_value(), Some(Value::Int(116)));

        // The pipeline takes `a` and `b`.
        let err = pipeline
            .predict(
                Inputs::new().arg(1i64).arg(2i64).arg(3i64),
                RunOptions::new(),
            )
            .unwrap_err();
        assert!(matches!(err, PipelineError::ArgumentBinding { .. }));
    }

    #[test]
    fn test_missing_input_is_binding_error() {
        let pipeline = chain();
        let err = pipeline
            .predict(Inputs::new(), RunOptions::new())
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ArgumentBinding { ref block, .. } if block == "mlblocks.math.add#1"
        ));
    }

    #[test]
    fn test_failure_keeps_partial_context() {
        let pipeline = chain();
        let mut context = Context::new().with("a", 1i64);
        let options = RunOptions::new().with_output(1usize);
        pipeline.predict_context(&mut context, options).unwrap();
        assert_eq!(context.get("out"), Some(&Value::Int(12)));

        context.insert("out", "text");
        let err = pipeline
            .predict_context(&mut context, RunOptions::new().with_start(2usize))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::PrimitiveExecution {
                phase: Phase::Produce,
                ..
            }
        ));
        assert_eq!(context.get("out"), Some(&Value::from("text")));
    }
}
