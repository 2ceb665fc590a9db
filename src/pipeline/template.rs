//! Serialized pipeline configurations.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{NameMap, Pipeline};
use crate::error::{PipelineError, Result};
use crate::hyperparameters::{Hyperparameters, TunableSchema};
use crate::primitive::PrimitiveResolver;

/// Everything needed to rebuild a pipeline, minus fitted state.
///
/// ```json
/// {
///   "primitives": ["mlblocks.preprocessing.StandardScaler", "mlblocks.linear_model.LogisticRegression"],
///   "init_params": {"mlblocks.linear_model.LogisticRegression#1": {"max_iter": 500}},
///   "input_names": {},
///   "output_names": {},
///   "hyperparameters": {...},
///   "tunable_hyperparameters": {...}
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub primitives: Vec<String>,
    #[serde(default)]
    pub init_params: IndexMap<String, Hyperparameters>,
    #[serde(default)]
    pub input_names: NameMap,
    #[serde(default)]
    pub output_names: NameMap,
    #[serde(default)]
    pub hyperparameters: IndexMap<String, Hyperparameters>,
    #[serde(default)]
    pub tunable_hyperparameters: IndexMap<String, TunableSchema>,
}

impl PipelineSpec {
    pub fn new(primitives: Vec<String>) -> Self {
        Self {
            primitives,
            ..Self::default()
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl Pipeline {
    /// Serialized configuration of this pipeline.
    ///
    /// Tunable metadata is stored unresolved so conditional hyperparameters
    /// survive a reload.
    pub fn to_dict(&self) -> PipelineSpec {
        PipelineSpec {
            primitives: self.primitives.clone(),
            init_params: self.init_params.clone(),
            input_names: self.input_names.clone(),
            output_names: self.output_names.clone(),
            hyperparameters: self
                .blocks
                .iter()
                .map(|(name, block)| (name.clone(), block.get_hyperparameters()))
                .collect(),
            tunable_hyperparameters: self
                .blocks
                .iter()
                .map(|(name, block)| (name.clone(), block.tunable_schema().clone()))
                .collect(),
        }
    }

    /// Build an unfitted pipeline from a serialized configuration.
    pub fn from_dict(spec: PipelineSpec, resolver: Arc<dyn PrimitiveResolver>) -> Result<Self> {
        let PipelineSpec {
            primitives,
            init_params,
            input_names,
            output_names,
            hyperparameters,
            tunable_hyperparameters,
        } = spec;

        let mut pipeline =
            Pipeline::assemble(resolver, primitives, init_params, input_names, output_names)?;
        pipeline.set_hyperparameters(hyperparameters)?;

        for (name, tunable) in tunable_hyperparameters {
            let block = pipeline.blocks.get_mut(&name).ok_or_else(|| {
                PipelineError::configuration(format!(
                    "tunable hyperparameters given for unknown block '{}'",
                    name
                ))
            })?;
            block.set_tunable_schema(tunable);
        }
        Ok(pipeline)
    }

    /// An unfitted copy sharing this pipeline's resolver.
    pub fn duplicate(&self) -> Result<Self> {
        Self::from_dict(self.to_dict(), Arc::clone(&self.resolver))
    }

    /// Build a pipeline from a template the resolver knows by name.
    pub fn from_template(name: &str, resolver: Arc<dyn PrimitiveResolver>) -> Result<Self> {
        let spec = resolver.pipeline_template(name).ok_or_else(|| {
            PipelineError::configuration(format!("unknown pipeline template '{}'", name))
        })?;
        debug!(template = %name, "building pipeline from template");
        Self::from_dict(spec, resolver)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_dict().save(path)
    }

    pub fn load<P: AsRef<Path>>(path: P, resolver: Arc<dyn PrimitiveResolver>) -> Result<Self> {
        Self::from_dict(PipelineSpec::load(path)?, resolver)
    }
}
