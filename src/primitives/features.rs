//! Polynomial feature generation.
//!
//! For an input row `[a, b]` the degree-2 features are `[a, b, a^2, ab, b^2]`,
//! preceded by a bias column of ones when `include_bias` is set.

use ndarray::Array2;

use crate::error::PrimitiveError;
use crate::hyperparameters::FixedSpec;
use crate::primitive::{ArgSpec, Args, OutputSpec, PrimitiveDescriptor, PrimitiveKind, ProduceSpec};
use crate::value::Value;

pub const POLYNOMIAL: &str = "mlblocks.features.polynomial";

pub fn polynomial_descriptor() -> PrimitiveDescriptor {
    PrimitiveDescriptor::new(
        POLYNOMIAL,
        PrimitiveKind::Function,
        ProduceSpec::function()
            .with_arg(ArgSpec::new("X").with_type("ndarray"))
            .with_output(OutputSpec::new("X").with_type("ndarray")),
    )
    .with_description("Expand features into all monomials up to a given degree")
    .with_fixed("degree", FixedSpec::with_default("int", 2))
    .with_fixed("include_bias", FixedSpec::with_default("bool", false))
}

pub fn polynomial(args: &Args) -> Result<Vec<Value>, PrimitiveError> {
    let x = args.matrix("X")?;
    let degree = args.int_opt("degree")?.unwrap_or(2);
    let include_bias = args.bool_opt("include_bias")?.unwrap_or(false);

    if degree < 1 {
        return Err(PrimitiveError::InvalidParameter(format!(
            "degree must be at least 1, got {}",
            degree
        )));
    }
    let combinations = monomials(x.ncols(), degree as usize);
    let n_out = combinations.len() + usize::from(include_bias);
    let offset = usize::from(include_bias);

    let mut out = Array2::<f64>::zeros((x.nrows(), n_out));
    for (row, mut target) in x.rows().into_iter().zip(out.rows_mut()) {
        if include_bias {
            target[0] = 1.0;
        }
        for (j, combo) in combinations.iter().enumerate() {
            target[offset + j] = combo.iter().map(|&col| row[col]).product();
        }
    }
    Ok(vec![Value::Matrix(out)])
}

/// Column-index multisets of size `1..=degree`, in graded lexicographic order.
fn monomials(n_features: usize, degree: usize) -> Vec<Vec<usize>> {
    let mut all = Vec::new();
    let mut current: Vec<Vec<usize>> = (0..n_features).map(|i| vec![i]).collect();
    for _ in 0..degree {
        all.extend(current.iter().cloned());
        current = current
            .iter()
            .flat_map(|combo| {
                let last = combo.last().copied().unwrap_or(0);
                (last..n_features).map(move |next| {
                    let mut extended = combo.clone();
                    extended.push(next);
                    extended
                })
            })
            .collect();
    }
    all
}
