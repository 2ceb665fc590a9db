//! Linear models trained by full-batch gradient descent.
//!
//! - [`LogisticRegression`]: binary or one-vs-rest multiclass classifier with
//!   optional L2 penalty. Labels are arbitrary `f64` class values.
//! - [`LinearRegression`]: least-squares regressor.
//!
//! Both follow the same shape: an unfitted config, `fit` learning
//! weights and bias, `produce` mapping `X` to predictions `y`.

use indexmap::IndexMap;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::{ensure_features, ensure_rows, param_f64, param_i64, param_str};
use crate::error::PrimitiveError;
use crate::hyperparameters::{Hyperparameters, TunableSpec};
use crate::primitive::{
    ArgSpec, Args, FitSpec, OutputSpec, Primitive, PrimitiveDescriptor, PrimitiveKind, ProduceSpec,
};
use crate::value::Value;

pub const LOGISTIC_REGRESSION: &str = "mlblocks.linear_model.LogisticRegression";
pub const LINEAR_REGRESSION: &str = "mlblocks.linear_model.LinearRegression";

fn supervised(name: &str) -> PrimitiveDescriptor {
    PrimitiveDescriptor::new(
        name,
        PrimitiveKind::Class,
        ProduceSpec::new("predict")
            .with_arg(ArgSpec::new("X").with_type("ndarray"))
            .with_output(OutputSpec::new("y").with_type("ndarray")),
    )
    .with_fit(
        FitSpec::new("fit")
            .with_arg(ArgSpec::new("X").with_type("ndarray"))
            .with_arg(ArgSpec::new("y").with_type("ndarray")),
    )
}

pub fn logistic_regression_descriptor() -> PrimitiveDescriptor {
    let mut alpha = IndexMap::new();
    alpha.insert("l2".to_string(), Some(TunableSpec::float(0.01, [1e-6, 10.0])));
    alpha.insert("none".to_string(), None);

    supervised(LOGISTIC_REGRESSION)
        .with_description("Logistic regression classifier (one-vs-rest for multiclass)")
        .with_tunable("learning_rate", TunableSpec::float(0.1, [1e-4, 1.0]))
        .with_tunable("max_iter", TunableSpec::int(300, [1, 100_000]))
        .with_tunable("penalty", TunableSpec::choice("none", ["none", "l2"]))
        .with_tunable(
            "alpha",
            TunableSpec::Conditional {
                condition: "penalty".to_string(),
                default: None,
                values: alpha,
            },
        )
}

pub fn linear_regression_descriptor() -> PrimitiveDescriptor {
    supervised(LINEAR_REGRESSION)
        .with_description("Least-squares linear regression")
        .with_tunable("learning_rate", TunableSpec::float(0.01, [1e-4, 1.0]))
        .with_tunable("max_iter", TunableSpec::int(1000, [1, 100_000]))
}

/// Regularization applied to the weights.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Penalty {
    None,
    L2(f64),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegressionConfig {
    pub learning_rate: f64,
    pub max_iter: usize,
    pub penalty: Penalty,
}

impl Default for LogisticRegressionConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iter: 300,
            penalty: Penalty::None,
        }
    }
}

impl LogisticRegressionConfig {
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_penalty(mut self, penalty: Penalty) -> Self {
        self.penalty = penalty;
        self
    }

    pub fn from_hyperparameters(hp: &Hyperparameters) -> Result<Self, PrimitiveError> {
        let penalty = match param_str(hp, "penalty", "none")? {
            "none" => Penalty::None,
            "l2" => Penalty::L2(param_f64(hp, "alpha", 0.01)?),
            other => {
                return Err(PrimitiveError::InvalidParameter(format!(
                    "unknown penalty '{}'",
                    other
                )))
            }
        };
        Ok(Self {
            learning_rate: param_f64(hp, "learning_rate", 0.1)?,
            max_iter: iterations(hp, 300)?,
            penalty,
        })
    }
}

fn iterations(hp: &Hyperparameters, default: i64) -> Result<usize, PrimitiveError> {
    let max_iter = param_i64(hp, "max_iter", default)?;
    usize::try_from(max_iter).map_err(|_| {
        PrimitiveError::InvalidParameter(format!("max_iter must be positive, got {}", max_iter))
    })
}

/// Weights and bias of one linear decision function.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearParams {
    pub weights: Array1<f64>,
    pub bias: f64,
}

impl LinearParams {
    fn zeros(n_features: usize) -> Self {
        Self {
            weights: Array1::zeros(n_features),
            bias: 0.0,
        }
    }

    fn decision(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.weights) + self.bias
    }

    /// One gradient step given the residuals `prediction - target`.
    fn step(&mut self, x: &Array2<f64>, residual: &Array1<f64>, learning_rate: f64, l2: f64) {
        let n = x.nrows() as f64;
        let mut grad_w = x.t().dot(residual) / n;
        if l2 > 0.0 {
            grad_w.scaled_add(l2, &self.weights);
        }
        let grad_b = residual.sum() / n;

        self.weights.scaled_add(-learning_rate, &grad_w);
        self.bias -= learning_rate * grad_b;
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let ez = z.exp();
        ez / (1.0 + ez)
    }
}

fn check_targets(x: &Array2<f64>, y: &Array1<f64>) -> Result<(), PrimitiveError> {
    if x.nrows() != y.len() {
        return Err(PrimitiveError::InvalidShape {
            expected: format!("{} targets", x.nrows()),
            got: format!("{} targets", y.len()),
        });
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogisticRegressionParams {
    /// Sorted distinct labels seen during fit.
    pub classes: Vec<f64>,
    /// One decision function per class, or a single one for binary problems.
    pub models: Vec<LinearParams>,
    pub n_features: usize,
}

#[derive(Clone, Debug, Default)]
pub struct LogisticRegression {
    config: LogisticRegressionConfig,
    params: Option<LogisticRegressionParams>,
}

impl LogisticRegression {
    pub fn new(config: LogisticRegressionConfig) -> Self {
        Self {
            config,
            params: None,
        }
    }

    pub fn params(&self) -> Option<&LogisticRegressionParams> {
        self.params.as_ref()
    }

    pub fn fit_xy(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), PrimitiveError> {
        ensure_rows(x, "fit LogisticRegression")?;
        check_targets(x, y)?;

        let mut classes: Vec<f64> = y.to_vec();
        classes.sort_by(|a, b| a.total_cmp(b));
        classes.dedup();

        let positives: &[f64] = match classes.len() {
            1 => &[],
            2 => &classes[1..],
            _ => &classes[..],
        };
        let models = positives
            .iter()
            .map(|&class| {
                let targets = y.mapv(|label| if label == class { 1.0 } else { 0.0 });
                self.train_binary(x, &targets)
            })
            .collect();

        self.params = Some(LogisticRegressionParams {
            classes,
            models,
            n_features: x.ncols(),
        });
        Ok(())
    }

    fn train_binary(&self, x: &Array2<f64>, targets: &Array1<f64>) -> LinearParams {
        let l2 = match self.config.penalty {
            Penalty::None => 0.0,
            Penalty::L2(alpha) => alpha,
        };
        let mut params = LinearParams::zeros(x.ncols());
        for _ in 0..self.config.max_iter {
            let probabilities = params.decision(x).mapv(sigmoid);
            let residual = probabilities - targets;
            params.step(x, &residual, self.config.learning_rate, l2);
        }
        params
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, PrimitiveError> {
        let params = self.params.as_ref().ok_or(PrimitiveError::NotFitted)?;
        ensure_features(x, params.n_features)?;

        let predictions = match params.models.as_slice() {
            [] => Array1::from_elem(x.nrows(), params.classes[0]),
            [single] => {
                let (negative, positive) = (params.classes[0], params.classes[1]);
                single
                    .decision(x)
                    .mapv(|z| if sigmoid(z) >= 0.5 { positive } else { negative })
            }
            models => {
                let scores: Vec<Array1<f64>> = models.iter().map(|m| m.decision(x)).collect();
                Array1::from_shape_fn(x.nrows(), |row| {
                    let best = (0..scores.len())
                        .max_by(|&a, &b| scores[a][row].total_cmp(&scores[b][row]))
                        .unwrap_or(0);
                    params.classes[best]
                })
            }
        };
        Ok(predictions)
    }
}

impl Primitive for LogisticRegression {
    fn fit(&mut self, args: &Args) -> Result<(), PrimitiveError> {
        self.fit_xy(args.matrix("X")?, &args.vector("y")?)
    }

    fn produce(&self, args: &Args) -> Result<Vec<Value>, PrimitiveError> {
        Ok(vec![Value::Vector(self.predict(args.matrix("X")?)?)])
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressionConfig {
    pub learning_rate: f64,
    pub max_iter: usize,
}

impl Default for LinearRegressionConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            max_iter: 1000,
        }
    }
}

impl LinearRegressionConfig {
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn from_hyperparameters(hp: &Hyperparameters) -> Result<Self, PrimitiveError> {
        Ok(Self {
            learning_rate: param_f64(hp, "learning_rate", 0.01)?,
            max_iter: iterations(hp, 1000)?,
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct LinearRegression {
    config: LinearRegressionConfig,
    params: Option<LinearParams>,
}

impl LinearRegression {
    pub fn new(config: LinearRegressionConfig) -> Self {
        Self {
            config,
            params: None,
        }
    }

    pub fn params(&self) -> Option<&LinearParams> {
        self.params.as_ref()
    }

    pub fn fit_xy(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), PrimitiveError> {
        ensure_rows(x, "fit LinearRegression")?;
        check_targets(x, y)?;

        let mut params = LinearParams::zeros(x.ncols());
        for _ in 0..self.config.max_iter {
            let residual = params.decision(x) - y;
            params.step(x, &residual, self.config.learning_rate, 0.0);
        }
        if !params.bias.is_finite() || params.weights.iter().any(|w| !w.is_finite()) {
            return Err(PrimitiveError::Other(format!(
                "gradient descent diverged with learning_rate {}",
                self.config.learning_rate
            )));
        }
        self.params = Some(params);
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>, PrimitiveError> {
        let params = self.params.as_ref().ok_or(PrimitiveError::NotFitted)?;
        ensure_features(x, params.weights.len())?;
        Ok(params.decision(x))
    }
}

impl Primitive for LinearRegression {
    fn fit(&mut self, args: &Args) -> Result<(), PrimitiveError> {
        self.fit_xy(args.matrix("X")?, &args.vector("y")?)
    }

    fn produce(&self, args: &Args) -> Result<Vec<Value>, PrimitiveError> {
        Ok(vec![Value::Vector(self.predict(args.matrix("X")?)?)])
    }
}
