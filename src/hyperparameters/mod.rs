//! Hyperparameter schemas and values.
//!
//! Values are JSON (`serde_json::Value`) so that any schema-conforming value
//! can be stored, validated and written back to a pipeline configuration
//! without loss.

mod schema;
mod view;

pub use schema::{FixedSpec, TunableSpec};
pub use view::{flatten, nest, Flat, HyperparameterView, Nested};

pub(crate) use schema::present;

use indexmap::IndexMap;

/// Hyperparameter values of a single block, keyed by parameter name.
pub type Hyperparameters = IndexMap<String, serde_json::Value>;

/// Tunable schemas of a single block, keyed by parameter name.
pub type TunableSchema = IndexMap<String, TunableSpec>;
