//! Serving context: full appraisals, city lookups and hot swapping.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use appraise::data::{DatasetBuilder, FeatureMap, PropertyRecord, SchemaError, SchemaPolicy};
use appraise::market::{CollaboratorError, CrimeIndex, Lookup, MarketStatus, SimilarityError};
use appraise::model::{EnsembleConfig, EnsembleModel, LearnerConfig, ServingConfig};
use appraise::testing::synthetic_housing;
use appraise::training::{EnsembleTrainer, Verbosity};
use appraise::{ContextHandle, Dataset, Error, ServingContext};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn trained(seed: u64) -> (Arc<EnsembleModel>, Dataset) {
    init_logging();
    let dataset = synthetic_housing(150, seed);
    let config = EnsembleConfig::builder()
        .learners(vec![
            LearnerConfig::depth_wise().with_n_trees(20),
            LearnerConfig::leaf_wise().with_n_trees(20),
        ])
        .verbosity(Verbosity::Silent)
        .build()
        .unwrap();
    let model = EnsembleTrainer::new(config).train(&dataset).unwrap();
    (Arc::new(model), dataset)
}

fn context(seed: u64) -> ServingContext {
    let (model, dataset) = trained(seed);
    ServingContext::new(model, &dataset, ServingConfig::default()).unwrap()
}

fn sample_record() -> PropertyRecord {
    let mut record = PropertyRecord::new(6000.0, 3, 2, 2);
    record.mainroad = true;
    record.parking = 1;
    record
}

#[test]
fn context_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ServingContext>();
    assert_send_sync::<ContextHandle>();
}

#[test]
fn appraisal_without_city() {
    let context = context(1);
    let appraisal = context.appraise(&sample_record()).unwrap();

    let p = &appraisal.prediction;
    assert!(p.price_lower <= p.predicted_price && p.predicted_price <= p.price_upper);
    assert!(appraisal.price_display.starts_with('₹'));
    assert!(appraisal.price_display.contains(" - "));
    assert!(appraisal.location.is_none());

    assert_eq!(appraisal.similar.len(), 5);
    let ranks: Vec<usize> = appraisal.similar.records.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    assert_ne!(appraisal.market.status, MarketStatus::Unknown);

    let attribution = &appraisal.attribution;
    let tolerance = 1e-6 * attribution.prediction.abs().max(1.0);
    assert!((attribution.reconstructed() - attribution.prediction).abs() <= tolerance);
    assert_eq!(Some(attribution.learner.clone()), context.summary().explained_learner);
}

#[test]
fn appraisal_with_known_and_unknown_city() {
    let context = context(2);

    let mut record = sample_record();
    record.city = Some("pune".into());
    let location = context.appraise(&record).unwrap().location.unwrap();
    assert_eq!(location.city, "Pune");
    assert_eq!(location.crime, Lookup::Reference(CrimeIndex::new(3.5)));
    assert!(location.market.fallback_used());

    record.city = Some("Atlantis".into());
    let location = context.appraise(&record).unwrap().location.unwrap();
    assert!(location.crime.fallback_used());
    assert_eq!(location.crime.value().crime_index, 5.0);
}

#[test]
fn slow_live_source_falls_back() {
    let (model, dataset) = trained(3);
    let config = ServingConfig::builder().lookup_timeout_secs(0.05).build().unwrap();
    let slow = |_: &str| -> Result<CrimeIndex, CollaboratorError> {
        thread::sleep(Duration::from_millis(500));
        Ok(CrimeIndex::new(1.0))
    };
    let context = ServingContext::new(model, &dataset, config).unwrap().with_crime_source(Arc::new(slow));

    let lookup = context.crime_index("Atlantis");
    assert!(lookup.fallback_used());
    assert_eq!(lookup.value().crime_index, 5.0);
}

#[test]
fn live_source_answers_unlisted_cities() {
    let (model, dataset) = trained(4);
    let live = |city: &str| -> Result<CrimeIndex, CollaboratorError> {
        match city {
            "Atlantis" => Ok(CrimeIndex::new(2.0)),
            _ => Err(CollaboratorError::Unreachable("offline".into())),
        }
    };
    let context = ServingContext::new(model, &dataset, ServingConfig::default())
        .unwrap()
        .with_crime_source(Arc::new(live));

    assert_eq!(context.crime_index("atlantis"), Lookup::Live(CrimeIndex::new(2.0)));
    assert!(context.crime_index("El Dorado").fallback_used());
    // reference table wins over the live source
    assert_eq!(context.crime_index("Delhi"), Lookup::Reference(CrimeIndex::new(7.8)));
}

#[test]
fn training_row_is_its_own_nearest_neighbour() {
    let (model, dataset) = trained(5);
    let context = ServingContext::new(Arc::clone(&model), &dataset, ServingConfig::default()).unwrap();

    let schema = model.schema().unwrap();
    let row = dataset.features().row(7).to_vec();
    let result = context.similar(&schema.to_map(&row), Some(1)).unwrap();
    let nearest = &result.records[0];
    assert_eq!(nearest.index, 7);
    assert_eq!(nearest.distance, 0.0);
    assert_eq!(nearest.similarity, 1.0);
    assert_eq!(nearest.target, dataset.targets()[7] as f64);
}

#[test]
fn reference_data_must_share_the_schema() {
    let (model, _) = trained(6);
    let other = DatasetBuilder::default()
        .add_feature("area", vec![1000.0, 2000.0])
        .targets(vec![1.0, 2.0])
        .build()
        .unwrap();
    let err = ServingContext::new(model, &other, ServingConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Schema(_)), "{err:?}");

    let untrained = Arc::new(EnsembleModel::new());
    let err = ServingContext::new(untrained, &synthetic_housing(20, 1), ServingConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Predict(_)), "{err:?}");
}

#[test]
fn handle_swaps_without_disturbing_readers() {
    let handle = ContextHandle::new(context(7));
    let before = handle.current();
    let weights_before = before.summary().weights;

    let replacement = context(8);
    let old = handle.replace(replacement);
    assert!(Arc::ptr_eq(&old, &before));

    // a reader holding the old snapshot keeps working
    assert!(before.appraise(&sample_record()).is_ok());
    let after = handle.current();
    assert!(!Arc::ptr_eq(&after, &before));
    assert_eq!(before.summary().weights, weights_before);
    assert!(after.appraise(&sample_record()).is_ok());
}

#[test]
fn concurrent_appraisals_agree() {
    let context = Arc::new(context(9));
    let expected = context.appraise(&sample_record()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let context = Arc::clone(&context);
            thread::spawn(move || context.appraise(&sample_record()).unwrap())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), expected);
    }
}

#[test]
fn non_finite_features_have_no_comparables() {
    let context = context(10);
    let mut features = sample_record().engineer();
    features.insert("area".into(), f32::NAN);

    let err = context.similar(&features, None).unwrap_err();
    let area = context.model().schema().unwrap().position("area").unwrap();
    assert!(
        matches!(err, Error::Similarity(SimilarityError::NonFinite { feature }) if feature == area),
        "{err:?}"
    );

    features.insert("area".into(), f32::INFINITY);
    assert!(matches!(context.similar(&features, Some(3)), Err(Error::Similarity(_))));
}

#[test]
fn strict_policy_rejects_incomplete_requests() {
    let (model, dataset) = trained(11);
    let config = ServingConfig::builder().schema_policy(SchemaPolicy::Strict).build().unwrap();
    let context = ServingContext::new(model, &dataset, config).unwrap();

    let mut partial = FeatureMap::new();
    partial.insert("area".into(), 5000.0);
    assert!(matches!(
        context.predict(&partial),
        Err(Error::Schema(SchemaError::MissingFeatures(_)))
    ));
    assert!(matches!(context.explain(&partial), Err(Error::Schema(_))));

    let mut features = sample_record().engineer();
    features.insert("bedrooms".into(), f32::NAN);
    assert!(matches!(
        context.similar(&features, None),
        Err(Error::Schema(SchemaError::NonFinite { .. }))
    ));

    // engineered records carry every schema feature
    assert!(context.appraise(&sample_record()).is_ok());
}
