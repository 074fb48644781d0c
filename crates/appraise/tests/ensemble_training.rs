//! End-to-end training and prediction on synthetic housing data.

use approx::assert_abs_diff_eq;

use appraise::data::{FeatureMap, PropertyRecord};
use appraise::explainability::ImportanceType;
use appraise::inference::EnsemblePredictor;
use appraise::model::{EnsembleConfig, EnsembleModel, LearnerConfig, PredictError};
use appraise::testing::synthetic_housing;
use appraise::training::{EnsembleTrainer, Verbosity};
use appraise::Parallelism;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn small_config() -> EnsembleConfig {
    let fast = |mut c: LearnerConfig| {
        c.n_trees = 40;
        c.learning_rate = 0.2;
        c
    };
    EnsembleConfig::builder()
        .learners(vec![fast(LearnerConfig::depth_wise()), fast(LearnerConfig::leaf_wise())])
        .verbosity(Verbosity::Info)
        .build()
        .unwrap()
}

fn trained(n: usize, seed: u64) -> EnsembleModel {
    init_logging();
    EnsembleTrainer::new(small_config()).train(&synthetic_housing(n, seed)).unwrap()
}

#[test]
fn weights_follow_held_out_r2() {
    let model = trained(250, 21);
    let metrics = model.metrics().unwrap();

    assert_eq!(metrics.n_test, 50);
    assert_eq!(metrics.weights, *model.weights());
    assert_abs_diff_eq!(model.weights().values().sum::<f64>(), 1.0, epsilon = 1e-9);
    assert!(model.weights().values().all(|w| *w >= 0.0));

    let r2_depth = metrics.individual["depthwise"].r2.max(1e-6);
    let r2_leaf = metrics.individual["leafwise"].r2.max(1e-6);
    assert_abs_diff_eq!(
        model.weights()["depthwise"],
        r2_depth / (r2_depth + r2_leaf),
        epsilon = 1e-12
    );
    assert!(metrics.ensemble.rmse > 0.0);
    assert!(metrics.ensemble.mape.is_some());
}

#[test]
fn predictions_are_banded_and_repeatable() {
    let model = trained(200, 4);
    let mut record = PropertyRecord::new(7420.0, 4, 2, 3);
    record.airconditioning = true;
    record.parking = 2;
    let input = record.engineer();

    let a = model.predict(&input).unwrap();
    let b = model.predict(&input).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.learner_predictions.len(), 2);
    assert!(a.price_lower <= a.predicted_price && a.predicted_price <= a.price_upper);
    assert!(a.price_lower >= 0.0);
    assert!(a.confidence <= 1.0);
    assert_abs_diff_eq!(
        a.price_upper - a.predicted_price,
        1.96 * a.dispersion,
        epsilon = 1e-6 * a.price_upper.max(1.0)
    );
}

#[test]
fn extra_and_missing_features_are_tolerated() {
    let model = trained(120, 8);
    let mut input = FeatureMap::new();
    input.insert("area".into(), 5000.0);
    input.insert("not_a_feature".into(), 1.0e9);
    assert!(model.predict(&input).is_ok());
    assert!(model.predict(&FeatureMap::new()).is_ok());
}

#[test]
fn batch_matches_single_rows() {
    init_logging();
    let dataset = synthetic_housing(120, 13);
    let model = EnsembleTrainer::new(small_config()).train(&dataset).unwrap();
    let schema = model.schema().unwrap();

    let batch = EnsemblePredictor::new(&model)
        .predict_batch(dataset.features().slice(ndarray::s![..10, ..]), Parallelism::Parallel)
        .unwrap();
    for (i, result) in batch.iter().enumerate() {
        let vector = schema.vector(dataset.features().row(i).to_vec()).unwrap();
        assert_eq!(*result, model.predict_vector(&vector).unwrap());
    }
}

#[test]
fn area_dominates_importance() {
    let model = trained(250, 2);
    let importance = model.feature_importance(ImportanceType::Gain).unwrap();
    assert_eq!(importance.per_learner.len(), 2);
    assert_abs_diff_eq!(importance.average.values().iter().sum::<f64>(), 1.0, epsilon = 1e-9);

    let top: Vec<String> = importance.average.top_k(3).into_iter().map(|(name, _)| name).collect();
    assert!(top.iter().any(|n| n == "area"), "top features: {top:?}");
}

#[test]
fn untrained_model_refuses_prediction() {
    let model = EnsembleModel::new();
    assert_eq!(model.predict(&FeatureMap::new()).unwrap_err(), PredictError::Untrained);
}
