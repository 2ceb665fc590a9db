//! Built-in primitives.
//!
//! A small library of preprocessing, linear models and plain functions that
//! can be composed into pipelines out of the box. Each module exposes a
//! `descriptor()` for its primitives next to the adapter implementation.

pub mod features;
pub mod imputation;
pub mod linear;
pub mod math;
pub mod scaling;

use ndarray::Array2;
use serde_json::Value as Json;

use crate::error::{PrimitiveError, Result as PipelineResult};
use crate::hyperparameters::Hyperparameters;
use crate::primitive::PrimitiveRegistry;

pub use imputation::{ImputeStrategy, SimpleImputer, SimpleImputerConfig};
pub use linear::{
    LinearRegression, LinearRegressionConfig, LogisticRegression, LogisticRegressionConfig,
    Penalty,
};
pub use scaling::{MinMaxScaler, MinMaxScalerConfig, StandardScaler, StandardScalerConfig};

/// Register every built-in primitive.
pub fn register_builtins(registry: &mut PrimitiveRegistry) -> PipelineResult<()> {
    registry.register_class(scaling::standard_scaler_descriptor(), |hp| {
        Ok(Box::new(StandardScaler::new(StandardScalerConfig::from_hyperparameters(hp)?)))
    })?;
    registry.register_class(scaling::min_max_scaler_descriptor(), |hp| {
        Ok(Box::new(MinMaxScaler::new(MinMaxScalerConfig::from_hyperparameters(hp)?)))
    })?;
    registry.register_class(imputation::descriptor(), |hp| {
        Ok(Box::new(SimpleImputer::new(SimpleImputerConfig::from_hyperparameters(hp)?)))
    })?;
    registry.register_class(linear::logistic_regression_descriptor(), |hp| {
        Ok(Box::new(LogisticRegression::new(
            LogisticRegressionConfig::from_hyperparameters(hp)?,
        )))
    })?;
    registry.register_class(linear::linear_regression_descriptor(), |hp| {
        Ok(Box::new(LinearRegression::new(
            LinearRegressionConfig::from_hyperparameters(hp)?,
        )))
    })?;
    registry.register_function(math::add_descriptor(), math::add)?;
    registry.register_function(features::polynomial_descriptor(), features::polynomial)?;
    Ok(())
}

/// Read a float hyperparameter, falling back to `default` when absent or null.
pub(crate) fn param_f64(hp: &Hyperparameters, name: &str, default: f64) -> Result<f64, PrimitiveError> {
    match hp.get(name) {
        None | Some(Json::Null) => Ok(default),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| invalid(name, "a number", value)),
    }
}

pub(crate) fn param_i64(hp: &Hyperparameters, name: &str, default: i64) -> Result<i64, PrimitiveError> {
    match hp.get(name) {
        None | Some(Json::Null) => Ok(default),
        Some(value) => value
            .as_i64()
            .ok_or_else(|| invalid(name, "an integer", value)),
    }
}

pub(crate) fn param_bool(hp: &Hyperparameters, name: &str, default: bool) -> Result<bool, PrimitiveError> {
    match hp.get(name) {
        None | Some(Json::Null) => Ok(default),
        Some(value) => value
            .as_bool()
            .ok_or_else(|| invalid(name, "a boolean", value)),
    }
}

pub(crate) fn param_str<'a>(
    hp: &'a Hyperparameters,
    name: &str,
    default: &'a str,
) -> Result<&'a str, PrimitiveError> {
    match hp.get(name) {
        None | Some(Json::Null) => Ok(default),
        Some(value) => value
            .as_str()
            .ok_or_else(|| invalid(name, "a string", value)),
    }
}

fn invalid(name: &str, expected: &str, got: &Json) -> PrimitiveError {
    PrimitiveError::InvalidParameter(format!("'{}' must be {}, got {}", name, expected, got))
}

/// Reject empty matrices with a message naming the operation.
pub(crate) fn ensure_rows(x: &Array2<f64>, what: &str) -> Result<(), PrimitiveError> {
    if x.nrows() == 0 {
        return Err(PrimitiveError::EmptyData(format!(
            "Cannot {} on empty data",
            what
        )));
    }
    Ok(())
}

pub(crate) fn ensure_features(x: &Array2<f64>, expected: usize) -> Result<(), PrimitiveError> {
    if x.ncols() != expected {
        return Err(PrimitiveError::FeatureMismatch {
            expected_features: expected,
            got_features: x.ncols(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_param_readers() {
        let mut hp = Hyperparameters::new();
        hp.insert("rate".to_string(), json!(0.5));
        hp.insert("iters".to_string(), json!(10));
        hp.insert("flag".to_string(), json!(false));
        hp.insert("mode".to_string(), json!("median"));
        hp.insert("unset".to_string(), Json::Null);

        assert_eq!(param_f64(&hp, "rate", 1.0).unwrap(), 0.5);
        assert_eq!(param_f64(&hp, "iters", 1.0).unwrap(), 10.0);
        assert_eq!(param_f64(&hp, "unset", 1.0).unwrap(), 1.0);
        assert_eq!(param_i64(&hp, "iters", 0).unwrap(), 10);
        assert!(!param_bool(&hp, "flag", true).unwrap());
        assert_eq!(param_str(&hp, "mode", "mean").unwrap(), "median");
        assert_eq!(param_str(&hp, "other", "mean").unwrap(), "mean");
    }

    #[test]
    fn test_param_readers_reject_wrong_types() {
        let mut hp = Hyperparameters::new();
        hp.insert("rate".to_string(), json!("fast"));
        assert!(matches!(
            param_f64(&hp, "rate", 1.0),
            Err(PrimitiveError::InvalidParameter(_))
        ));
        assert!(param_i64(&hp, "rate", 1).is_err());
    }

    #[test]
    fn test_builtin_descriptors_validate() {
        let descriptors = [
            scaling::standard_scaler_descriptor(),
            scaling::min_max_scaler_descriptor(),
            imputation::descriptor(),
            linear::logistic_regression_descriptor(),
            linear::linear_regression_descriptor(),
            math::add_descriptor(),
            features::polynomial_descriptor(),
        ];
        for descriptor in descriptors {
            assert!(
                descriptor.validate().is_ok(),
                "descriptor {} should be valid",
                descriptor.name
            );
        }
    }
}
