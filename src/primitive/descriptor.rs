//! Serializable description of a primitive's interface.
//!
//! A descriptor says what a primitive consumes and produces and which
//! hyperparameters it accepts. It is what the engine reads to bind context
//! variables to arguments; the adapter itself never sees variable names.
//!
//! # Example
//! ```ignore
//! let descriptor = PrimitiveDescriptor::new(
//!     "my.Scaler",
//!     PrimitiveKind::Class,
//!     ProduceSpec::new("transform").with_arg(ArgSpec::new("X")).with_output(OutputSpec::new("X")),
//! )
//! .with_fit(FitSpec::new("fit").with_arg(ArgSpec::new("X")))
//! .with_fixed("with_mean", FixedSpec::with_default("bool", true));
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{PipelineError, Result};
use crate::hyperparameters::{present, FixedSpec, TunableSchema, TunableSpec};

/// Whether the primitive is a constructible object or a plain function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Class,
    Function,
}

/// A declared fit or produce argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgSpec {
    /// Default context variable name, and keyword name unless `keyword` is set.
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Json>,
    /// Keyword under which the value is passed to the adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

impl ArgSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
            default: None,
            keyword: None,
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<Json>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn keyword(&self) -> &str {
        self.keyword.as_deref().unwrap_or(&self.name)
    }
}

/// A declared produce output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
}

impl OutputSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FitSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
}

impl FitSpec {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProduceSpec {
    /// Method name for class primitives; absent for functions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    #[serde(default)]
    pub output: Vec<OutputSpec>,
}

impl ProduceSpec {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            ..Self::default()
        }
    }

    /// Produce spec of a function primitive.
    pub fn function() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_output(mut self, output: OutputSpec) -> Self {
        self.output.push(output);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HyperparameterSchema {
    #[serde(default)]
    pub fixed: IndexMap<String, FixedSpec>,
    #[serde(default)]
    pub tunable: TunableSchema,
}

impl HyperparameterSchema {
    /// Whether `name` is declared as a fixed or tunable hyperparameter.
    pub fn declares(&self, name: &str) -> bool {
        self.fixed.contains_key(name) || self.tunable.contains_key(name)
    }
}

/// Everything the engine knows about a primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimitiveDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PrimitiveKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitSpec>,
    pub produce: ProduceSpec,
    #[serde(default)]
    pub hyperparameters: HyperparameterSchema,
}

impl PrimitiveDescriptor {
    pub fn new(name: impl Into<String>, kind: PrimitiveKind, produce: ProduceSpec) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            fit: None,
            produce,
            hyperparameters: HyperparameterSchema::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_fit(mut self, fit: FitSpec) -> Self {
        self.fit = Some(fit);
        self
    }

    pub fn with_fixed(mut self, name: impl Into<String>, spec: FixedSpec) -> Self {
        self.hyperparameters.fixed.insert(name.into(), spec);
        self
    }

    pub fn with_tunable(mut self, name: impl Into<String>, spec: TunableSpec) -> Self {
        self.hyperparameters.tunable.insert(name.into(), spec);
        self
    }

    /// Parse a descriptor from its JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let descriptor: Self = serde_json::from_str(json)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Fit arguments; empty when the primitive has no fit phase.
    pub fn fit_args(&self) -> &[ArgSpec] {
        self.fit.as_ref().map(|f| f.args.as_slice()).unwrap_or(&[])
    }

    pub fn produce_args(&self) -> &[ArgSpec] {
        &self.produce.args
    }

    pub fn outputs(&self) -> &[OutputSpec] {
        &self.produce.output
    }

    /// Whether produce must be preceded by a successful fit.
    pub fn requires_fit(&self) -> bool {
        self.kind == PrimitiveKind::Class && self.fit.is_some()
    }

    /// Whether `name` is a declared fit or produce argument.
    pub fn declares_arg(&self, name: &str) -> bool {
        self.fit_args()
            .iter()
            .chain(self.produce_args())
            .any(|arg| arg.name == name)
    }

    /// Check the descriptor for structural mistakes.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(PipelineError::configuration("primitive name is empty"));
        }

        match self.kind {
            PrimitiveKind::Class => {
                if self.produce.method.is_none() {
                    return Err(PipelineError::configuration(format!(
                        "class primitive '{}' does not declare a produce method",
                        self.name
                    )));
                }
            }
            PrimitiveKind::Function => {
                if self.fit.is_some() {
                    return Err(PipelineError::configuration(format!(
                        "function primitive '{}' cannot declare a fit phase",
                        self.name
                    )));
                }
            }
        }

        let mut seen = Vec::with_capacity(self.produce.output.len());
        for output in &self.produce.output {
            if seen.contains(&output.name.as_str()) {
                return Err(PipelineError::configuration(format!(
                    "primitive '{}' declares output '{}' twice",
                    self.name, output.name
                )));
            }
            seen.push(output.name.as_str());
        }

        for (name, spec) in &self.hyperparameters.tunable {
            if let Some(condition) = spec.condition() {
                if !self.hyperparameters.declares(condition) {
                    return Err(PipelineError::configuration(format!(
                        "hyperparameter '{}' of '{}' depends on undeclared '{}'",
                        name, self.name, condition
                    )));
                }
            }
        }

        Ok(())
    }
}
