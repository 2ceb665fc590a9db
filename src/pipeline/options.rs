//! Inputs, partial-execution selectors and results of a pipeline run.

use crate::context::Context;
use crate::value::Value;

/// Selects a block by zero-based position or by instance name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRef {
    Index(usize),
    Name(String),
}

impl From<usize> for BlockRef {
    fn from(index: usize) -> Self {
        BlockRef::Index(index)
    }
}

impl From<&str> for BlockRef {
    fn from(name: &str) -> Self {
        BlockRef::Name(name.to_string())
    }
}

impl From<String> for BlockRef {
    fn from(name: String) -> Self {
        BlockRef::Name(name)
    }
}

/// Where a run stops and what it returns.
///
/// - `Index` or `Name` of a block: run through it, return the whole context.
/// - `Name` of the form `block.variable`: run through the block, return the
///   variable.
/// - `Names`: run through the block of the last entry, return every
///   requested variable in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSelector {
    Index(usize),
    Name(String),
    Names(Vec<String>),
}

impl From<usize> for OutputSelector {
    fn from(index: usize) -> Self {
        OutputSelector::Index(index)
    }
}

impl From<&str> for OutputSelector {
    fn from(name: &str) -> Self {
        OutputSelector::Name(name.to_string())
    }
}

impl From<String> for OutputSelector {
    fn from(name: String) -> Self {
        OutputSelector::Name(name)
    }
}

impl<S: Into<String>> From<Vec<S>> for OutputSelector {
    fn from(names: Vec<S>) -> Self {
        OutputSelector::Names(names.into_iter().map(Into::into).collect())
    }
}

/// Partial-execution options for `fit` and `predict`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub start: Option<BlockRef>,
    pub output: Option<OutputSelector>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start(mut self, start: impl Into<BlockRef>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<OutputSelector>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// Data a run starts from.
///
/// Positional values bind, in order, to the pipeline's input names for the
/// phase being run; named values go into the context as given and win over
/// positional ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    pub positional: Vec<Value>,
    pub named: Context,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name, value);
        self
    }
}

impl From<Context> for Inputs {
    fn from(named: Context) -> Self {
        Self {
            positional: Vec::new(),
            named,
        }
    }
}

impl From<Vec<Value>> for Inputs {
    fn from(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: Context::new(),
        }
    }
}

/// What a run returns, depending on the output selection.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutput {
    Context(Context),
    Value(Value),
    Values(Vec<Value>),
}

impl RunOutput {
    pub fn into_context(self) -> Option<Context> {
        match self {
            RunOutput::Context(context) => Some(context),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            RunOutput::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_values(self) -> Option<Vec<Value>> {
        match self {
            RunOutput::Values(values) => Some(values),
            _ => None,
        }
    }
}
