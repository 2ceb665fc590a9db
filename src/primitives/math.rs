//! Arithmetic function primitives.

use crate::error::PrimitiveError;
use crate::primitive::{ArgSpec, Args, OutputSpec, PrimitiveDescriptor, PrimitiveKind, ProduceSpec};
use crate::value::Value;

pub const ADD: &str = "mlblocks.math.add";

pub fn add_descriptor() -> PrimitiveDescriptor {
    PrimitiveDescriptor::new(
        ADD,
        PrimitiveKind::Function,
        ProduceSpec::function()
            .with_arg(ArgSpec::new("a"))
            .with_arg(ArgSpec::new("b"))
            .with_output(OutputSpec::new("out")),
    )
    .with_description("Element-wise sum of two numbers or arrays")
}

/// `out = a + b` for scalars, same-shaped arrays, or an array and a scalar.
pub fn add(args: &Args) -> Result<Vec<Value>, PrimitiveError> {
    let a = args.value("a")?;
    let b = args.value("b")?;

    let sum = match (a, b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(x + y),
        (Value::Vector(x), Value::Vector(y)) => {
            if x.len() != y.len() {
                return Err(shape_error(x.len().to_string(), y.len().to_string()));
            }
            Value::Vector(x + y)
        }
        (Value::Matrix(x), Value::Matrix(y)) => {
            if x.dim() != y.dim() {
                return Err(shape_error(format!("{:?}", x.dim()), format!("{:?}", y.dim())));
            }
            Value::Matrix(x + y)
        }
        (Value::Vector(v), s) | (s, Value::Vector(v)) if s.as_float().is_some() => {
            Value::Vector(v + s.as_float().unwrap_or_default())
        }
        (Value::Matrix(m), s) | (s, Value::Matrix(m)) if s.as_float().is_some() => {
            Value::Matrix(m + s.as_float().unwrap_or_default())
        }
        (x, y) => match (x.as_float(), y.as_float()) {
            (Some(x), Some(y)) => Value::Float(x + y),
            _ => {
                return Err(PrimitiveError::Other(format!(
                    "cannot add {} and {}",
                    x.kind(),
                    y.kind()
                )))
            }
        },
    };
    Ok(vec![sum])
}

fn shape_error(expected: String, got: String) -> PrimitiveError {
    PrimitiveError::InvalidShape { expected, got }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sum(a: impl Into<Value>, b: impl Into<Value>) -> Result<Value, PrimitiveError> {
        let args = Args::new().with("a", a).with("b", b);
        add(&args).map(|mut out| out.remove(0))
    }

    #[test]
    fn test_add_scalars() {
        assert_eq!(sum(2i64, 3i64).unwrap(), Value::Int(5));
        assert_eq!(sum(2i64, 0.5).unwrap(), Value::Float(2.5));
    }

    #[test]
    fn test_add_arrays() {
        assert_eq!(
            sum(array![1.0, 2.0], array![3.0, 4.0]).unwrap(),
            Value::Vector(array![4.0, 6.0])
        );
        assert_eq!(
            sum(array![[1.0]], 1i64).unwrap(),
            Value::Matrix(array![[2.0]])
        );
        assert_eq!(
            sum(10.0, array![1.0]).unwrap(),
            Value::Vector(array![11.0])
        );
    }

    #[test]
    fn test_add_rejects_mismatches() {
        assert!(matches!(
            sum(array![1.0], array![1.0, 2.0]),
            Err(PrimitiveError::InvalidShape { .. })
        ));
        assert!(sum("a", 1i64).is_err());
        assert!(matches!(
            add(&Args::new().with("a", 1i64)),
            Err(PrimitiveError::MissingArgument(name)) if name == "b"
        ));
    }
}
