//! Simple Imputer.
//!
//! Replaces missing values (`NaN`) column by column using the mean, the
//! median, or a constant `fill_value`. `fill_value` is only active when
//! `strategy` is `constant`.

use indexmap::IndexMap;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::{ensure_features, ensure_rows, param_f64, param_str};
use crate::error::PrimitiveError;
use crate::hyperparameters::{Hyperparameters, TunableSpec};
use crate::primitive::{
    ArgSpec, Args, FitSpec, OutputSpec, Primitive, PrimitiveDescriptor, PrimitiveKind, ProduceSpec,
};
use crate::value::Value;

pub const SIMPLE_IMPUTER: &str = "mlblocks.preprocessing.SimpleImputer";

pub fn descriptor() -> PrimitiveDescriptor {
    let mut fill_values = IndexMap::new();
    fill_values.insert(
        "constant".to_string(),
        Some(TunableSpec::float(0.0, [-1e6, 1e6])),
    );

    PrimitiveDescriptor::new(
        SIMPLE_IMPUTER,
        PrimitiveKind::Class,
        ProduceSpec::new("transform")
            .with_arg(ArgSpec::new("X").with_type("ndarray"))
            .with_output(OutputSpec::new("X").with_type("ndarray")),
    )
    .with_description("Impute missing values column by column")
    .with_fit(FitSpec::new("fit").with_arg(ArgSpec::new("X").with_type("ndarray")))
    .with_tunable(
        "strategy",
        TunableSpec::choice("mean", ["mean", "median", "constant"]),
    )
    .with_tunable(
        "fill_value",
        TunableSpec::Conditional {
            condition: "strategy".to_string(),
            default: None,
            values: fill_values,
        },
    )
}

/// Strategy for imputing missing values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ImputeStrategy {
    Mean,
    Median,
    Constant(f64),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimpleImputerConfig {
    pub strategy: ImputeStrategy,
}

impl Default for SimpleImputerConfig {
    fn default() -> Self {
        Self {
            strategy: ImputeStrategy::Mean,
        }
    }
}

impl SimpleImputerConfig {
    pub fn with_strategy(mut self, strategy: ImputeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn from_hyperparameters(hp: &Hyperparameters) -> Result<Self, PrimitiveError> {
        let strategy = match param_str(hp, "strategy", "mean")? {
            "mean" => ImputeStrategy::Mean,
            "median" => ImputeStrategy::Median,
            "constant" => ImputeStrategy::Constant(param_f64(hp, "fill_value", 0.0)?),
            other => {
                return Err(PrimitiveError::InvalidParameter(format!(
                    "unknown imputation strategy '{}'",
                    other
                )))
            }
        };
        Ok(Self { strategy })
    }
}

#[derive(Clone, Debug, Default)]
pub struct SimpleImputer {
    config: SimpleImputerConfig,
    statistics: Option<Array1<f64>>,
}

impl SimpleImputer {
    pub fn new(config: SimpleImputerConfig) -> Self {
        Self {
            config,
            statistics: None,
        }
    }

    /// Per-column fill values learned during fit.
    pub fn statistics(&self) -> Option<&Array1<f64>> {
        self.statistics.as_ref()
    }

    pub fn fit_matrix(&mut self, x: &Array2<f64>) -> Result<(), PrimitiveError> {
        ensure_rows(x, "fit SimpleImputer")?;
        let stats = x
            .columns()
            .into_iter()
            .map(|column| {
                let present: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
                column_statistic(present, self.config.strategy)
            })
            .collect::<Array1<f64>>();
        self.statistics = Some(stats);
        Ok(())
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, PrimitiveError> {
        let stats = self.statistics.as_ref().ok_or(PrimitiveError::NotFitted)?;
        ensure_features(x, stats.len())?;

        let mut out = x.to_owned();
        for (mut column, &fill) in out.columns_mut().into_iter().zip(stats.iter()) {
            column.mapv_inplace(|v| if v.is_nan() { fill } else { v });
        }
        Ok(out)
    }
}

fn column_statistic(mut present: Vec<f64>, strategy: ImputeStrategy) -> f64 {
    match strategy {
        ImputeStrategy::Constant(value) => value,
        // An all-missing column falls back to zero.
        _ if present.is_empty() => 0.0,
        ImputeStrategy::Mean => present.iter().sum::<f64>() / present.len() as f64,
        ImputeStrategy::Median => {
            present.sort_by(|a, b| a.total_cmp(b));
            let n = present.len();
            if n % 2 == 0 {
                (present[n / 2 - 1] + present[n / 2]) / 2.0
            } else {
                present[n / 2]
            }
        }
    }
}

impl Primitive for SimpleImputer {
    fn fit(&mut self, args: &Args) -> Result<(), PrimitiveError> {
        self.fit_matrix(args.matrix("X")?)
    }

    fn produce(&self, args: &Args) -> Result<Vec<Value>, PrimitiveError> {
        Ok(vec![Value::Matrix(self.transform(args.matrix("X")?)?)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use serde_json::json;

    #[test]
    fn test_mean_imputation() {
        let x = array![[1.0, f64::NAN], [3.0, 4.0], [f64::NAN, 8.0]];
        let mut imputer = SimpleImputer::default();
        imputer.fit_matrix(&x).unwrap();

        assert_eq!(imputer.statistics().unwrap(), &array![2.0, 6.0]);
        let out = imputer.transform(&x).unwrap();
        assert_eq!(out, array![[1.0, 6.0], [3.0, 4.0], [2.0, 8.0]]);
    }

    #[test]
    fn test_median_imputation() {
        let x = array![[1.0], [f64::NAN], [2.0], [10.0]];
        let mut imputer =
            SimpleImputer::new(SimpleImputerConfig::default().with_strategy(ImputeStrategy::Median));
        imputer.fit_matrix(&x).unwrap();
        assert_eq!(imputer.statistics().unwrap(), &array![2.0]);
    }

    #[test]
    fn test_constant_from_hyperparameters() {
        let mut hp = Hyperparameters::new();
        hp.insert("strategy".to_string(), json!("constant"));
        hp.insert("fill_value".to_string(), json!(-1));

        let config = SimpleImputerConfig::from_hyperparameters(&hp).unwrap();
        assert_eq!(config.strategy, ImputeStrategy::Constant(-1.0));

        let mut imputer = SimpleImputer::new(config);
        let x = array![[f64::NAN, 2.0]];
        imputer.fit_matrix(&x).unwrap();
        assert_eq!(imputer.transform(&x).unwrap(), array![[-1.0, 2.0]]);
    }

    #[test]
    fn test_all_missing_column_falls_back_to_zero() {
        let x = array![[f64::NAN], [f64::NAN]];
        let mut imputer = SimpleImputer::default();
        imputer.fit_matrix(&x).unwrap();
        assert_eq!(imputer.transform(&x).unwrap(), array![[0.0], [0.0]]);
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let mut hp = Hyperparameters::new();
        hp.insert("strategy".to_string(), json!("mode"));
        assert!(SimpleImputerConfig::from_hyperparameters(&hp).is_err());
    }

    #[test]
    fn test_fill_value_is_conditional_on_strategy() {
        let descriptor = descriptor();
        let spec = &descriptor.hyperparameters.tunable["fill_value"];

        let mut current = Hyperparameters::new();
        current.insert("strategy".to_string(), json!("mean"));
        assert!(spec.resolve(&current).is_none());

        current.insert("strategy".to_string(), json!("constant"));
        assert!(spec.resolve(&current).is_some());
    }
}
