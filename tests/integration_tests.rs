use std::sync::Arc;

use indexmap::IndexMap;
use mlblocks::primitives::{
    features, imputation, linear, math, scaling, LogisticRegression, LogisticRegressionConfig,
    StandardScaler, StandardScalerConfig,
};
use mlblocks::{
    BlockStatus, Context, Hyperparameters, Inputs, Phase, Pipeline, PipelineError,
    PrimitiveError, PrimitiveRegistry, PrimitiveResolver, RunOptions, RunOutput, Value,
};
use ndarray::{array, Array1, Array2};
use serde_json::json;

const SCALER: &str = "mlblocks.preprocessing.StandardScaler#1";
const CLASSIFIER: &str = "mlblocks.linear_model.LogisticRegression#1";

fn registry() -> Arc<dyn PrimitiveResolver> {
    Arc::new(PrimitiveRegistry::with_builtins().unwrap())
}

/// Two well-separated clusters around (1, 1) and (8, 8).
fn clusters() -> (Array2<f64>, Array1<f64>) {
    let x = array![
        [1.0, 1.2],
        [0.8, 1.0],
        [1.3, 0.9],
        [1.1, 1.4],
        [8.0, 8.3],
        [7.8, 8.1],
        [8.4, 7.9],
        [8.1, 7.7],
    ];
    let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0];
    (x, y)
}

fn classifier_pipeline() -> Pipeline {
    Pipeline::new(
        [scaling::STANDARD_SCALER, linear::LOGISTIC_REGRESSION],
        registry(),
    )
    .unwrap()
}

fn train_inputs() -> Inputs {
    let (x, y) = clusters();
    Inputs::new().named("X", x).named("y", y)
}

fn block_values(block: &str, pairs: &[(&str, serde_json::Value)]) -> IndexMap<String, Hyperparameters> {
    let values = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    let mut nested = IndexMap::new();
    nested.insert(block.to_string(), values);
    nested
}

fn vector(output: RunOutput) -> Array1<f64> {
    output
        .into_value()
        .and_then(|v| v.as_vector().cloned())
        .expect("expected a vector output")
}

#[test]
fn test_scaler_classifier_fit_predict() {
    let mut pipeline = classifier_pipeline();
    pipeline.fit(train_inputs(), RunOptions::new()).unwrap();

    let x_test = array![[0.9, 1.1], [8.2, 8.0], [1.2, 1.0]];
    let predictions = vector(
        pipeline
            .predict(Inputs::new().named("X", x_test), RunOptions::new())
            .unwrap(),
    );
    assert_eq!(predictions, array![0.0, 1.0, 0.0]);

    let hp = pipeline.get_hyperparameters(false).into_nested();
    let keys: Vec<_> = hp.keys().map(String::as_str).collect();
    assert_eq!(keys, vec![SCALER, CLASSIFIER]);
}

#[test]
fn test_positional_fit_inputs() {
    let (x, y) = clusters();
    let mut pipeline = classifier_pipeline();
    pipeline
        .fit(Inputs::new().arg(x.clone()).arg(y.clone()), RunOptions::new())
        .unwrap();

    let predictions = vector(pipeline.predict(Inputs::new().arg(x), RunOptions::new()).unwrap());
    assert_eq!(predictions, y);
}

#[test]
fn test_fit_without_targets_names_block() {
    let (x, _) = clusters();
    let mut pipeline = classifier_pipeline();
    let err = pipeline
        .fit(Inputs::new().named("X", x), RunOptions::new())
        .unwrap_err();

    assert!(
        matches!(err, PipelineError::ArgumentBinding { ref block, .. } if block == CLASSIFIER),
        "unexpected error: {}",
        err
    );
    assert!(err.to_string().contains(CLASSIFIER));
}

#[test]
fn test_repeated_primitives_are_numbered() {
    let pipeline = Pipeline::new(
        [math::ADD, math::ADD, features::POLYNOMIAL],
        registry(),
    )
    .unwrap();
    let names: Vec<_> = pipeline.block_names().collect();
    assert_eq!(
        names,
        vec![
            "mlblocks.math.add#1",
            "mlblocks.math.add#2",
            "mlblocks.features.polynomial#1",
        ]
    );
}

fn feature_pipeline() -> Pipeline {
    Pipeline::builder(registry())
        .primitives([
            imputation::SIMPLE_IMPUTER,
            features::POLYNOMIAL,
            linear::LOGISTIC_REGRESSION,
        ])
        .output_name("mlblocks.features.polynomial#1", "X", "features")
        .input_name(CLASSIFIER, "X", "features")
        .build()
        .unwrap()
}

#[test]
fn test_output_index_returns_context() {
    let mut pipeline = feature_pipeline();
    let context = pipeline
        .fit(train_inputs(), RunOptions::new().with_output(1usize))
        .unwrap()
        .into_context()
        .unwrap();

    let names: Vec<_> = context.names().collect();
    assert_eq!(names, vec!["X", "y", "features"]);
    assert_eq!(context.get("features").unwrap().as_matrix().unwrap().ncols(), 5);
    // The classifier was never reached.
    assert_eq!(
        pipeline.block(CLASSIFIER).unwrap().status(),
        BlockStatus::Built
    );
}

#[test]
fn test_output_variable_returns_value() {
    let mut pipeline = feature_pipeline();
    let features = pipeline
        .fit(
            train_inputs(),
            RunOptions::new().with_output("mlblocks.features.polynomial#1.features"),
        )
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(features.as_matrix().unwrap().dim(), (8, 5));
}

#[test]
fn test_output_list_returns_values_in_order() {
    let mut pipeline = feature_pipeline();
    pipeline.fit(train_inputs(), RunOptions::new()).unwrap();

    let (x, _) = clusters();
    let values = pipeline
        .predict(
            Inputs::new().named("X", x),
            RunOptions::new().with_output(vec![
                "mlblocks.features.polynomial#1.features",
                "mlblocks.linear_model.LogisticRegression#1.y",
            ]),
        )
        .unwrap()
        .into_values()
        .unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[1].as_vector().unwrap().len(), 8);
}

#[test]
fn test_reconfigured_block_must_be_refitted() {
    let mut pipeline = classifier_pipeline();
    pipeline.fit(train_inputs(), RunOptions::new()).unwrap();
    assert!(pipeline.block(CLASSIFIER).unwrap().is_fitted());

    pipeline
        .set_hyperparameters(block_values(CLASSIFIER, &[("learning_rate", json!(0.2))]))
        .unwrap();
    assert_eq!(
        pipeline.block(CLASSIFIER).unwrap().status(),
        BlockStatus::Built
    );
    // Unchanged blocks keep their fitted state.
    assert!(pipeline.block(SCALER).unwrap().is_fitted());

    let (x, y) = clusters();
    let err = pipeline
        .predict(Inputs::new().named("X", x.clone()), RunOptions::new())
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFitted { ref block } if block == CLASSIFIER));

    pipeline.fit(train_inputs(), RunOptions::new()).unwrap();
    let predictions = vector(pipeline.predict(Inputs::new().named("X", x), RunOptions::new()).unwrap());
    assert_eq!(predictions, y);
}

#[test]
fn test_predict_before_fit() {
    let pipeline = classifier_pipeline();
    let (x, _) = clusters();
    let err = pipeline
        .predict(Inputs::new().named("X", x), RunOptions::new())
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFitted { ref block } if block == SCALER));
}

#[test]
fn test_matches_hand_composed_primitives() {
    let (x, y) = clusters();
    let x_test = array![[0.5, 0.7], [9.0, 8.8], [4.0, 4.6]];

    let mut scaler = StandardScaler::new(StandardScalerConfig::default());
    scaler.fit_matrix(&x).unwrap();
    let scaled = scaler.transform(&x).unwrap();
    let mut classifier = LogisticRegression::new(LogisticRegressionConfig::default());
    classifier.fit_xy(&scaled, &y).unwrap();
    let expected = classifier
        .predict(&scaler.transform(&x_test).unwrap())
        .unwrap();

    let mut pipeline = classifier_pipeline();
    pipeline.fit(train_inputs(), RunOptions::new()).unwrap();
    let got = vector(
        pipeline
            .predict(Inputs::new().named("X", x_test), RunOptions::new())
            .unwrap(),
    );
    assert_eq!(got, expected);
}

#[test]
fn test_split_fit_equals_full_fit() {
    let (x, _) = clusters();

    let mut full = feature_pipeline();
    full.fit(train_inputs(), RunOptions::new()).unwrap();

    let mut split = feature_pipeline();
    let context = split
        .fit(train_inputs(), RunOptions::new().with_output(1usize))
        .unwrap()
        .into_context()
        .unwrap();
    split
        .fit(context, RunOptions::new().with_start(2usize))
        .unwrap();

    let expected = full
        .predict(Inputs::new().named("X", x.clone()), RunOptions::new())
        .unwrap();
    let got = split
        .predict(Inputs::new().named("X", x), RunOptions::new())
        .unwrap();
    assert_eq!(got, expected);
}

#[test]
fn test_split_predict_equals_full_predict() {
    let (x, _) = clusters();
    let mut pipeline = feature_pipeline();
    pipeline.fit(train_inputs(), RunOptions::new()).unwrap();

    let full = pipeline
        .predict(Inputs::new().named("X", x.clone()), RunOptions::new())
        .unwrap();

    let mut context = Context::new().with("X", x);
    pipeline
        .predict_context(&mut context, RunOptions::new().with_output(0usize))
        .unwrap();
    let resumed = pipeline
        .predict_context(&mut context, RunOptions::new().with_start(1usize))
        .unwrap();
    assert_eq!(resumed, full);
}

#[test]
fn test_hyperparameter_round_trip() {
    let mut pipeline = feature_pipeline();
    let before = pipeline.to_dict();

    let nested = pipeline.get_hyperparameters(false);
    pipeline.set_hyperparameters(nested).unwrap();
    let flat = pipeline.get_hyperparameters(true);
    pipeline.set_hyperparameters(flat).unwrap();

    assert_eq!(pipeline.to_dict(), before);
}

#[test]
fn test_conditional_hyperparameter_activation() {
    let mut pipeline = classifier_pipeline();
    let hp = pipeline.get_hyperparameters(false).into_nested();
    assert!(!hp[CLASSIFIER].contains_key("alpha"));

    pipeline
        .set_hyperparameters(block_values(CLASSIFIER, &[("penalty", json!("l2"))]))
        .unwrap();
    let hp = pipeline.get_hyperparameters(false).into_nested();
    assert_eq!(hp[CLASSIFIER]["alpha"], json!(0.01));

    let tunable = pipeline.get_tunable_hyperparameters(false).into_nested();
    assert_eq!(tunable[CLASSIFIER]["alpha"].type_name(), "float");
}

#[test]
fn test_invalid_hyperparameters_leave_block_untouched() {
    let mut pipeline = classifier_pipeline();
    let before = pipeline.get_hyperparameters(false);

    for values in [
        block_values(CLASSIFIER, &[("learning_rate", json!(5.0))]),
        block_values(CLASSIFIER, &[("penalty", json!("l1"))]),
        block_values(CLASSIFIER, &[("max_iter", json!("many"))]),
        block_values(CLASSIFIER, &[("momentum", json!(0.9))]),
    ] {
        let err = pipeline.set_hyperparameters(values).unwrap_err();
        assert!(matches!(err, PipelineError::Hyperparameter { .. }), "got {}", err);
    }
    assert_eq!(pipeline.get_hyperparameters(false), before);
}

#[test]
fn test_copy_isolation() {
    let mut original = classifier_pipeline();
    original.fit(train_inputs(), RunOptions::new()).unwrap();

    let mut copy = original.duplicate().unwrap();
    assert!(!copy.block(CLASSIFIER).unwrap().is_fitted());

    copy.set_hyperparameters(block_values(CLASSIFIER, &[("max_iter", json!(10))]))
        .unwrap();
    assert!(original.block(CLASSIFIER).unwrap().is_fitted());
    assert_eq!(
        original.get_hyperparameters(false).into_nested()[CLASSIFIER]["max_iter"],
        json!(300)
    );
}

#[test]
fn test_primitive_failure_keeps_source() {
    let mut pipeline = classifier_pipeline();
    pipeline.fit(train_inputs(), RunOptions::new()).unwrap();

    let err = pipeline
        .predict(
            Inputs::new().named("X", array![[1.0, 2.0, 3.0]]),
            RunOptions::new(),
        )
        .unwrap_err();
    match err {
        PipelineError::PrimitiveExecution {
            ref block,
            phase,
            ref source,
        } => {
            assert_eq!(block, SCALER);
            assert_eq!(phase, Phase::Produce);
            assert!(matches!(source, PrimitiveError::FeatureMismatch { .. }));
        }
        ref other => panic!("unexpected error: {}", other),
    }
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_wrong_value_type_is_binding_error() {
    let mut pipeline = classifier_pipeline();
    let err = pipeline
        .fit(
            Inputs::new().named("X", "not a matrix").named("y", array![0.0]),
            RunOptions::new(),
        )
        .unwrap_err();
    assert!(matches!(err, PipelineError::ArgumentBinding { ref block, .. } if block == SCALER));
}

#[test]
fn test_custom_function_primitive() {
    use mlblocks::primitive::{ArgSpec, OutputSpec, ProduceSpec};
    use mlblocks::{PrimitiveDescriptor, PrimitiveKind};

    let mut registry = PrimitiveRegistry::with_builtins().unwrap();
    registry
        .register_function(
            PrimitiveDescriptor::new(
                "custom.negate",
                PrimitiveKind::Function,
                ProduceSpec::function()
                    .with_arg(ArgSpec::new("out"))
                    .with_output(OutputSpec::new("out")),
            ),
            |args| match args.value("out")? {
                Value::Int(v) => Ok(vec![Value::Int(-v)]),
                other => Err(PrimitiveError::Other(format!("cannot negate {}", other.kind()))),
            },
        )
        .unwrap();

    let mut init = Hyperparameters::new();
    init.insert("b".to_string(), json!(4));
    let pipeline = Pipeline::builder(Arc::new(registry))
        .primitives([math::ADD, "custom.negate"])
        .init_params(math::ADD, init)
        .build()
        .unwrap();

    let out = pipeline
        .predict(Inputs::new().named("a", 3i64), RunOptions::new())
        .unwrap();
    assert_eq!(out, RunOutput::Value(Value::Int(-7)));
}

#[test]
fn test_pipeline_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<Pipeline>();
}
