//! # mlblocks
//!
//! Compose independently developed machine learning primitives into
//! pipelines that can be fitted, run partially, tuned and serialized.
//!
//! ## Core Concepts
//!
//! - **Primitive**: a registered unit of computation with a descriptor that
//!   declares its fit and produce arguments, outputs and hyperparameters.
//!   Class primitives hold fitted state; function primitives are stateless.
//! - **Block**: one instance of a primitive inside a pipeline, named
//!   `{primitive}#{n}`. It owns the hyperparameter values and the constructed
//!   object.
//! - **Context**: the variable store blocks read their arguments from and
//!   write their outputs to.
//! - **Pipeline**: an ordered list of blocks. `fit` and `predict` walk it in
//!   order and can start or stop at any block.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use mlblocks::{Inputs, Pipeline, PrimitiveRegistry, RunOptions, Value};
//! use ndarray::array;
//!
//! let registry = Arc::new(PrimitiveRegistry::with_builtins().unwrap());
//! let mut pipeline = Pipeline::new(
//!     [
//!         "mlblocks.preprocessing.StandardScaler",
//!         "mlblocks.linear_model.LogisticRegression",
//!     ],
//!     registry,
//! )
//! .unwrap();
//!
//! let x = array![[0.0, 0.1], [0.2, 0.0], [5.0, 5.1], [5.2, 4.9]];
//! let y = array![0.0, 0.0, 1.0, 1.0];
//! pipeline
//!     .fit(Inputs::new().named("X", x.clone()).named("y", y), RunOptions::new())
//!     .unwrap();
//!
//! let predictions = pipeline
//!     .predict(Inputs::new().named("X", x), RunOptions::new())
//!     .unwrap()
//!     .into_value()
//!     .and_then(|v| v.as_vector().cloned())
//!     .unwrap();
//! assert_eq!(predictions.len(), 4);
//! ```
//!
//! ## Module Structure
//!
//! - `primitive`: Descriptors, the `Primitive` trait and the registry
//! - `primitives`: Built-in scalers, imputer, linear models and functions
//! - `block`: Hyperparameter handling and execution of a single primitive
//! - `pipeline`: Sequencing, partial execution and serialization
//! - `hyperparameters`: Tunable specs and nested/flat views
//! - `context`, `value`: Runtime data passed between blocks
//! - `error`: Error types shared by all of the above

pub mod block;
pub mod context;
pub mod error;
pub mod hyperparameters;
pub mod pipeline;
pub mod primitive;
pub mod primitives;
pub mod value;

pub use block::{Block, BlockStatus};
pub use context::Context;
pub use error::{Phase, PipelineError, PrimitiveError, Result};
pub use hyperparameters::{FixedSpec, HyperparameterView, Hyperparameters, TunableSchema, TunableSpec};
pub use pipeline::{
    BlockRef, Inputs, OutputSelector, Pipeline, PipelineBuilder, PipelineInput, PipelineOutput,
    PipelineSpec, RunOptions, RunOutput,
};
pub use primitive::{
    Args, Primitive, PrimitiveDescriptor, PrimitiveKind, PrimitiveRegistry, PrimitiveResolver,
};
pub use value::{Value, ValueKind};
