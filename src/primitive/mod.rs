//! Primitive adapters and their registration.
//!
//! A primitive is an externally implemented ML component. The engine talks to
//! it through one of two adapters:
//!
//! - **class** primitives are constructed from hyperparameters into a
//!   [`Primitive`] object, which is fitted and then asked to produce;
//! - **function** primitives are a plain [`PrimitiveFunction`] called with the
//!   produce arguments plus the block's hyperparameters.
//!
//! Adapters receive keyword arguments as [`Args`] and return produce outputs
//! positionally, in the order the descriptor declares them.

mod descriptor;
mod registry;

pub use descriptor::{
    ArgSpec, FitSpec, HyperparameterSchema, OutputSpec, PrimitiveDescriptor, PrimitiveKind,
    ProduceSpec,
};
pub use registry::{PrimitiveRegistry, PrimitiveResolver};

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use ndarray::{Array1, Array2};

use crate::error::PrimitiveError;
use crate::hyperparameters::Hyperparameters;
use crate::value::{Value, ValueKind};

/// Keyword arguments passed to an adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    values: IndexMap<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, keyword: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(keyword, value);
        self
    }

    pub fn insert(&mut self, keyword: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(keyword.into(), value.into());
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.values.contains_key(keyword)
    }

    pub fn get(&self, keyword: &str) -> Option<&Value> {
        self.values.get(keyword)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Required argument of any kind.
    pub fn value(&self, keyword: &str) -> Result<&Value, PrimitiveError> {
        self.values
            .get(keyword)
            .ok_or_else(|| PrimitiveError::MissingArgument(keyword.to_string()))
    }

    pub fn matrix(&self, keyword: &str) -> Result<&Array2<f64>, PrimitiveError> {
        let value = self.value(keyword)?;
        value
            .as_matrix()
            .ok_or_else(|| mismatch(keyword, ValueKind::Matrix, value))
    }

    /// Required 1-D numeric argument. Numeric lists are accepted.
    pub fn vector(&self, keyword: &str) -> Result<Array1<f64>, PrimitiveError> {
        let value = self.value(keyword)?;
        match value {
            Value::Vector(v) => Ok(v.clone()),
            Value::List(items) => items
                .iter()
                .map(Value::as_float)
                .collect::<Option<Vec<f64>>>()
                .map(Array1::from)
                .ok_or_else(|| mismatch(keyword, ValueKind::Vector, value)),
            other => Err(mismatch(keyword, ValueKind::Vector, other)),
        }
    }

    pub fn float(&self, keyword: &str) -> Result<f64, PrimitiveError> {
        let value = self.value(keyword)?;
        value
            .as_float()
            .ok_or_else(|| mismatch(keyword, ValueKind::Float, value))
    }

    pub fn int(&self, keyword: &str) -> Result<i64, PrimitiveError> {
        let value = self.value(keyword)?;
        value
            .as_int()
            .ok_or_else(|| mismatch(keyword, ValueKind::Int, value))
    }

    pub fn bool(&self, keyword: &str) -> Result<bool, PrimitiveError> {
        let value = self.value(keyword)?;
        value
            .as_bool()
            .ok_or_else(|| mismatch(keyword, ValueKind::Bool, value))
    }

    pub fn str(&self, keyword: &str) -> Result<&str, PrimitiveError> {
        let value = self.value(keyword)?;
        value
            .as_str()
            .ok_or_else(|| mismatch(keyword, ValueKind::Str, value))
    }

    /// Optional float: absent or `Null` yields `None`.
    pub fn float_opt(&self, keyword: &str) -> Result<Option<f64>, PrimitiveError> {
        match self.values.get(keyword) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.float(keyword).map(Some),
        }
    }

    /// Optional int: absent or `Null` yields `None`.
    pub fn int_opt(&self, keyword: &str) -> Result<Option<i64>, PrimitiveError> {
        match self.values.get(keyword) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.int(keyword).map(Some),
        }
    }

    /// Optional bool: absent or `Null` yields `None`.
    pub fn bool_opt(&self, keyword: &str) -> Result<Option<bool>, PrimitiveError> {
        match self.values.get(keyword) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.bool(keyword).map(Some),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Args {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn mismatch(keyword: &str, expected: ValueKind, got: &Value) -> PrimitiveError {
    PrimitiveError::TypeMismatch {
        name: keyword.to_string(),
        expected,
        got: got.kind(),
    }
}

/// A constructed class primitive.
pub trait Primitive: Send {
    /// Learn state from the fit arguments. Primitives without a fit phase
    /// keep the default no-op.
    fn fit(&mut self, _args: &Args) -> Result<(), PrimitiveError> {
        Ok(())
    }

    /// Compute outputs, positionally, in declared output order.
    fn produce(&self, args: &Args) -> Result<Vec<Value>, PrimitiveError>;
}

/// Builds a class primitive from the block's construction hyperparameters.
pub type PrimitiveConstructor =
    Arc<dyn Fn(&Hyperparameters) -> Result<Box<dyn Primitive>, PrimitiveError> + Send + Sync>;

/// A function primitive.
pub type PrimitiveFunction =
    Arc<dyn Fn(&Args) -> Result<Vec<Value>, PrimitiveError> + Send + Sync>;

#[derive(Clone)]
pub enum PrimitiveAdapter {
    Class(PrimitiveConstructor),
    Function(PrimitiveFunction),
}

impl PrimitiveAdapter {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            PrimitiveAdapter::Class(_) => PrimitiveKind::Class,
            PrimitiveAdapter::Function(_) => PrimitiveKind::Function,
        }
    }
}

impl fmt::Debug for PrimitiveAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveAdapter::Class(_) => write!(f, "PrimitiveAdapter::Class"),
            PrimitiveAdapter::Function(_) => write!(f, "PrimitiveAdapter::Function"),
        }
    }
}

/// A descriptor paired with the adapter that implements it.
#[derive(Debug, Clone)]
pub struct RegisteredPrimitive {
    descriptor: PrimitiveDescriptor,
    adapter: PrimitiveAdapter,
}

impl RegisteredPrimitive {
    pub(crate) fn new(descriptor: PrimitiveDescriptor, adapter: PrimitiveAdapter) -> Self {
        Self {
            descriptor,
            adapter,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &PrimitiveDescriptor {
        &self.descriptor
    }

    pub fn adapter(&self) -> &PrimitiveAdapter {
        &self.adapter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_typed_accessors() {
        let args = Args::new()
            .with("X", array![[1.0, 2.0]])
            .with("n", 3i64)
            .with("rate", 0.5)
            .with("flag", true)
            .with("mode", "fast");

        assert_eq!(args.matrix("X").unwrap().ncols(), 2);
        assert_eq!(args.int("n").unwrap(), 3);
        assert_eq!(args.float("n").unwrap(), 3.0);
        assert_eq!(args.float("rate").unwrap(), 0.5);
        assert!(args.bool("flag").unwrap());
        assert_eq!(args.str("mode").unwrap(), "fast");
    }

    #[test]
    fn test_missing_and_mismatched() {
        let args = Args::new().with("X", "not a matrix");

        assert_eq!(
            args.matrix("y").unwrap_err(),
            PrimitiveError::MissingArgument("y".to_string())
        );
        assert!(matches!(
            args.matrix("X").unwrap_err(),
            PrimitiveError::TypeMismatch {
                expected: ValueKind::Matrix,
                got: ValueKind::Str,
                ..
            }
        ));
    }

    #[test]
    fn test_vector_accepts_numeric_list() {
        let args = Args::new()
            .with("y", Value::List(vec![Value::Int(1), Value::Float(0.5)]))
            .with("z", Value::List(vec![Value::Str("a".into())]));

        assert_eq!(args.vector("y").unwrap(), array![1.0, 0.5]);
        assert!(args.vector("z").is_err());
    }

    #[test]
    fn test_optional_accessors() {
        let args = Args::new().with("a", Value::Null).with("b", 2i64);
        assert_eq!(args.float_opt("a").unwrap(), None);
        assert_eq!(args.float_opt("missing").unwrap(), None);
        assert_eq!(args.int_opt("b").unwrap(), Some(2));
        assert!(args.bool_opt("b").is_err());
    }

    #[test]
    fn test_default_fit_is_noop() {
        struct Echo;
        impl Primitive for Echo {
            fn produce(&self, args: &Args) -> Result<Vec<Value>, PrimitiveError> {
                Ok(vec![args.value("x")?.clone()])
            }
        }

        let mut echo = Echo;
        assert!(echo.fit(&Args::new()).is_ok());
        let out = echo.produce(&Args::new().with("x", 1i64)).unwrap();
        assert_eq!(out, vec![Value::Int(1)]);
    }
}
