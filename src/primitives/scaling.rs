//! Feature scaling primitives.
//!
//! - [`StandardScaler`]: z-score normalization, `z = (x - u) / s`.
//! - [`MinMaxScaler`]: rescales each feature to `[feature_min, feature_max]`.
//!
//! Both learn per-column statistics in `fit` and apply them in `produce`.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::{ensure_features, ensure_rows, param_bool, param_f64};
use crate::error::PrimitiveError;
use crate::hyperparameters::{FixedSpec, Hyperparameters, TunableSpec};
use crate::primitive::{
    ArgSpec, Args, FitSpec, OutputSpec, Primitive, PrimitiveDescriptor, PrimitiveKind, ProduceSpec,
};
use crate::value::Value;

pub const STANDARD_SCALER: &str = "mlblocks.preprocessing.StandardScaler";
pub const MIN_MAX_SCALER: &str = "mlblocks.preprocessing.MinMaxScaler";

fn matrix_in_out(name: &str, method: &str) -> PrimitiveDescriptor {
    PrimitiveDescriptor::new(
        name,
        PrimitiveKind::Class,
        ProduceSpec::new(method)
            .with_arg(ArgSpec::new("X").with_type("ndarray"))
            .with_output(OutputSpec::new("X").with_type("ndarray")),
    )
    .with_fit(FitSpec::new("fit").with_arg(ArgSpec::new("X").with_type("ndarray")))
}

pub fn standard_scaler_descriptor() -> PrimitiveDescriptor {
    matrix_in_out(STANDARD_SCALER, "transform")
        .with_description("Standardize features by removing the mean and scaling to unit variance")
        .with_fixed("with_mean", FixedSpec::with_default("bool", true))
        .with_fixed("with_std", FixedSpec::with_default("bool", true))
}

pub fn min_max_scaler_descriptor() -> PrimitiveDescriptor {
    matrix_in_out(MIN_MAX_SCALER, "transform")
        .with_description("Scale each feature to a given range")
        .with_tunable("feature_min", TunableSpec::float(0.0, [-10.0, 0.0]))
        .with_tunable("feature_max", TunableSpec::float(1.0, [1.0, 10.0]))
}

/// Configuration for StandardScaler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardScalerConfig {
    /// Center the data before scaling.
    pub with_mean: bool,
    /// Scale the data to unit variance.
    pub with_std: bool,
}

impl Default for StandardScalerConfig {
    fn default() -> Self {
        Self {
            with_mean: true,
            with_std: true,
        }
    }
}

impl StandardScalerConfig {
    pub fn with_mean(mut self, with_mean: bool) -> Self {
        self.with_mean = with_mean;
        self
    }

    pub fn with_std(mut self, with_std: bool) -> Self {
        self.with_std = with_std;
        self
    }

    pub fn from_hyperparameters(hp: &Hyperparameters) -> Result<Self, PrimitiveError> {
        Ok(Self {
            with_mean: param_bool(hp, "with_mean", true)?,
            with_std: param_bool(hp, "with_std", true)?,
        })
    }
}

/// Per-column statistics learned by [`StandardScaler`].
#[derive(Clone, Debug, PartialEq)]
pub struct StandardScalerParams {
    pub mean: Array1<f64>,
    /// Standard deviation, with zero-variance columns replaced by 1.
    pub std: Array1<f64>,
    pub n_features: usize,
}

#[derive(Clone, Debug, Default)]
pub struct StandardScaler {
    config: StandardScalerConfig,
    params: Option<StandardScalerParams>,
}

impl StandardScaler {
    pub fn new(config: StandardScalerConfig) -> Self {
        Self {
            config,
            params: None,
        }
    }

    pub fn params(&self) -> Option<&StandardScalerParams> {
        self.params.as_ref()
    }

    pub fn fit_matrix(&mut self, x: &Array2<f64>) -> Result<(), PrimitiveError> {
        ensure_rows(x, "fit StandardScaler")?;

        let n_features = x.ncols();
        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(n_features));
        let mut std = x.std_axis(Axis(0), 0.0);
        std.mapv_inplace(|s| if s == 0.0 { 1.0 } else { s });

        self.params = Some(StandardScalerParams {
            mean,
            std,
            n_features,
        });
        Ok(())
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, PrimitiveError> {
        let params = self.params.as_ref().ok_or(PrimitiveError::NotFitted)?;
        ensure_features(x, params.n_features)?;

        let mut out = x.to_owned();
        if self.config.with_mean {
            out -= &params.mean;
        }
        if self.config.with_std {
            out /= &params.std;
        }
        Ok(out)
    }
}

impl Primitive for StandardScaler {
    fn fit(&mut self, args: &Args) -> Result<(), PrimitiveError> {
        self.fit_matrix(args.matrix("X")?)
    }

    fn produce(&self, args: &Args) -> Result<Vec<Value>, PrimitiveError> {
        Ok(vec![Value::Matrix(self.transform(args.matrix("X")?)?)])
    }
}

/// Configuration for MinMaxScaler.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScalerConfig {
    pub feature_min: f64,
    pub feature_max: f64,
}

impl Default for MinMaxScalerConfig {
    fn default() -> Self {
        Self {
            feature_min: 0.0,
            feature_max: 1.0,
        }
    }
}

impl MinMaxScalerConfig {
    pub fn with_range(mut self, feature_min: f64, feature_max: f64) -> Self {
        self.feature_min = feature_min;
        self.feature_max = feature_max;
        self
    }

    pub fn from_hyperparameters(hp: &Hyperparameters) -> Result<Self, PrimitiveError> {
        let config = Self {
            feature_min: param_f64(hp, "feature_min", 0.0)?,
            feature_max: param_f64(hp, "feature_max", 1.0)?,
        };
        if config.feature_min >= config.feature_max {
            return Err(PrimitiveError::InvalidParameter(format!(
                "feature_min ({}) must be lower than feature_max ({})",
                config.feature_min, config.feature_max
            )));
        }
        Ok(config)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MinMaxScalerParams {
    pub data_min: Array1<f64>,
    pub scale: Array1<f64>,
    pub n_features: usize,
}

#[derive(Clone, Debug, Default)]
pub struct MinMaxScaler {
    config: MinMaxScalerConfig,
    params: Option<MinMaxScalerParams>,
}

impl MinMaxScaler {
    pub fn new(config: MinMaxScalerConfig) -> Self {
        Self {
            config,
            params: None,
        }
    }

    pub fn fit_matrix(&mut self, x: &Array2<f64>) -> Result<(), PrimitiveError> {
        ensure_rows(x, "fit MinMaxScaler")?;

        let data_min = x.fold_axis(Axis(0), f64::INFINITY, |&acc, &v| acc.min(v));
        let data_max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |&acc, &v| acc.max(v));

        let target_range = self.config.feature_max - self.config.feature_min;
        let scale = ndarray::Zip::from(&data_min)
            .and(&data_max)
            .map_collect(|&lo, &hi| {
                let range = hi - lo;
                // Constant columns map to feature_min.
                if range == 0.0 {
                    1.0
                } else {
                    target_range / range
                }
            });

        self.params = Some(MinMaxScalerParams {
            data_min,
            scale,
            n_features: x.ncols(),
        });
        Ok(())
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, PrimitiveError> {
        let params = self.params.as_ref().ok_or(PrimitiveError::NotFitted)?;
        ensure_features(x, params.n_features)?;

        let mut out = x.to_owned();
        out -= &params.data_min;
        out *= &params.scale;
        out += self.config.feature_min;
        Ok(out)
    }
}

impl Primitive for MinMaxScaler {
    fn fit(&mut self, args: &Args) -> Result<(), PrimitiveError> {
        self.fit_matrix(args.matrix("X")?)
    }

    fn produce(&self, args: &Args) -> Result<Vec<Value>, PrimitiveError> {
        Ok(vec![Value::Matrix(self.transform(args.matrix("X")?)?)])
    }
}
