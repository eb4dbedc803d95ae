use igloo_common::{
    BigEndianI32Coder, BincodeCoder, Coder, CoderError, CoderRef, CoderRegistry, Error, Options,
    VarIntCoder,
};
use igloo_connector_memory::{BoundedReader, BoundedSource, Create, InMemorySource};
use igloo_testing::{
    assert_sources_equal_reference_source, assert_split_at_fraction_behavior,
    assert_split_at_fraction_exhaustive, read_from_source, ExpectedSplitOutcome,
    SplitAtFractionResult,
};
use rand::Rng;
use rstest::rstest;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use std::sync::Arc;

fn big_endian_source(values: impl IntoIterator<Item = i32>) -> InMemorySource<i32> {
    Create::of(values)
        .with_coder(Arc::new(BigEndianI32Coder))
        .into_source(&CoderRegistry::new())
        .unwrap()
}

fn random_ints(n: usize) -> Vec<i32> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| rng.gen()).collect()
}

#[test]
fn split_into_bundles_reproduces_source() {
    let options = Options::default();
    let source = big_endian_source(1..=8);

    let bundles = source.split_into_bundles(12, &options).unwrap();

    let ranges: Vec<_> = bundles.iter().map(|b| (b.start(), b.end())).collect();
    assert_eq!(ranges, vec![(0, 3), (3, 6), (6, 8)]);
    assert_sources_equal_reference_source(&source, &bundles, &options).unwrap();
}

#[rstest]
#[case(1)]
#[case(4)]
#[case(7)]
#[case(16)]
#[case(100)]
#[case(1 << 20)]
fn any_bundle_size_tiles_the_source(#[case] desired_bundle_size_bytes: u64) {
    let options = Options::default();
    let values = random_ints(50);
    let source = InMemorySource::from_values(values.clone(), Arc::new(VarIntCoder)).unwrap();

    let bundles = source.split_into_bundles(desired_bundle_size_bytes, &options).unwrap();

    assert!(!bundles.is_empty() && bundles.len() <= values.len());
    assert!(bundles.iter().all(|b| !b.is_empty()));
    assert_sources_equal_reference_source(&source, &bundles, &options).unwrap();
    assert_eq!(read_from_source(&source, &options).unwrap(), values);
}

#[test]
fn sorted_input_still_does_not_produce_sorted_keys() {
    let source = big_endian_source(0..100);
    assert!(!source.produces_sorted_keys(&Options::default()).unwrap());
}

#[test]
fn default_output_coder_is_the_supplied_coder() {
    let coder: CoderRef<i32> = Arc::new(VarIntCoder);
    let source = Create::of(vec![1, 2, 3])
        .with_coder(Arc::clone(&coder))
        .into_source(&CoderRegistry::standard())
        .unwrap();

    assert!(Arc::ptr_eq(&source.default_output_coder().unwrap(), &coder));
    for bundle in source.split_into_bundles(1, &Options::default()).unwrap() {
        assert!(Arc::ptr_eq(&bundle.default_output_coder().unwrap(), &coder));
    }
}

#[test]
fn estimated_size_is_encoded_size() {
    let options = Options::default();
    let source = big_endian_source(0..8);
    assert_eq!(source.estimated_size_bytes(&options).unwrap(), 32);

    let bundles = source.split_into_bundles(12, &options).unwrap();
    let sizes: Vec<u64> = bundles
        .iter()
        .map(|b| b.estimated_size_bytes(&options).unwrap())
        .collect();
    assert_eq!(sizes, vec![12, 12, 8]);
}

#[test]
fn split_outcomes_follow_reader_position() {
    let options = Options::default();
    let source = big_endian_source(0..10);

    // nothing read yet
    assert_split_at_fraction_behavior(&source, 0, 0.5, ExpectedSplitOutcome::MustFail, &options)
        .unwrap();

    let accepted = assert_split_at_fraction_behavior(
        &source,
        1,
        0.5,
        ExpectedSplitOutcome::MustSucceedAndBeConsistent,
        &options,
    )
    .unwrap();
    assert_eq!(
        accepted,
        Some(SplitAtFractionResult { num_primary_items: 5, num_residual_items: 5 })
    );

    // positioned on element 5, the boundary at 5 is already consumed
    assert_split_at_fraction_behavior(&source, 6, 0.5, ExpectedSplitOutcome::MustFail, &options)
        .unwrap();
    assert_split_at_fraction_behavior(&source, 10, 0.9, ExpectedSplitOutcome::MustFail, &options)
        .unwrap();
}

#[test]
fn exhaustive_splits_on_random_ints() {
    let options = Options::default();
    let source = InMemorySource::from_values(random_ints(25), Arc::new(VarIntCoder)).unwrap();

    let report = assert_split_at_fraction_exhaustive(&source, &options).unwrap();

    assert!(report.accepted > 0);
    assert!(report.accepted < report.attempts);
    assert_eq!(report.concurrent_runs, report.accepted * 3);
}

#[test]
fn exhaustive_splits_on_bundles() {
    let options = Options::default();
    let source = big_endian_source(0..40);
    for bundle in source.split_into_bundles(64, &options).unwrap() {
        assert_split_at_fraction_exhaustive(&bundle, &options).unwrap();
    }
}

#[rstest]
#[case(0)]
#[case(1)]
fn tiny_sources_never_split(#[case] n: i32) {
    let options = Options::default();
    let report = assert_split_at_fraction_exhaustive(&big_endian_source(0..n), &options).unwrap();
    assert_eq!(report.accepted, 0);
}

/// A record that cannot leave its thread.
#[derive(Debug, PartialEq)]
struct LocalRecord {
    name: Rc<str>,
}

#[derive(Debug)]
struct LocalRecordCoder;

impl Coder<LocalRecord> for LocalRecordCoder {
    fn encode(&self, value: &LocalRecord) -> Result<Vec<u8>, CoderError> {
        Ok(value.name.as_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<LocalRecord, CoderError> {
        let name = std::str::from_utf8(bytes).map_err(|e| CoderError::Custom(e.to_string()))?;
        Ok(LocalRecord { name: Rc::from(name) })
    }
}

#[test]
fn thread_bound_elements_are_read_on_other_threads() {
    let records = ["alpha", "beta", "gamma"].map(|name| LocalRecord { name: Rc::from(name) });
    let source = Create::of(records)
        .with_coder(Arc::new(LocalRecordCoder))
        .into_source(&CoderRegistry::standard())
        .unwrap();
    let bundles = source.split_into_bundles(5, &Options::default()).unwrap();
    assert!(bundles.len() > 1);

    let names: Vec<String> = std::thread::scope(|scope| {
        let workers: Vec<_> = bundles
            .iter()
            .map(|bundle| {
                scope.spawn(move || {
                    let mut reader = bundle.open().unwrap();
                    let mut names = Vec::new();
                    let mut more = reader.start().unwrap();
                    while more {
                        names.push(reader.current().unwrap().name.to_string());
                        more = reader.advance().unwrap();
                    }
                    names
                })
            })
            .collect();
        workers.into_iter().flat_map(|w| w.join().unwrap()).collect()
    });
    assert_eq!(names, vec!["alpha", "beta", "gamma"]);
}

#[test]
fn missing_coder_fails_before_any_read() {
    #[derive(Debug)]
    struct Unregistered(#[allow(dead_code)] u8);

    let err = Create::of(vec![Unregistered(1), Unregistered(2)])
        .into_source(&CoderRegistry::standard())
        .unwrap_err();
    assert!(matches!(err, Error::CoderResolution { .. }));
    let message = err.to_string();
    assert!(message.contains("Unable to infer a coder"), "{message}");
    assert!(message.contains("Unregistered"), "{message}");
}

#[test]
fn nullable_strings_resolve_from_registry() {
    let options = Options::default();
    let values = vec![Some("a".to_string()), None, Some(String::new()), None, Some("z".into())];
    let source = Create::of(values.clone()).into_source(&CoderRegistry::standard()).unwrap();

    let bundles = source.split_into_bundles(2, &options).unwrap();
    assert!(bundles.len() > 1);
    assert_sources_equal_reference_source(&source, &bundles, &options).unwrap();
    assert_eq!(read_from_source(&source, &options).unwrap(), values);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Event {
    id: u64,
    tags: Vec<String>,
}

#[test]
fn serde_records_split_and_read_back() {
    let options = Options::default();
    let mut registry = CoderRegistry::standard();
    registry.register::<Event>(Arc::new(BincodeCoder::<Event>::new()));
    let events: Vec<Event> = (0..12)
        .map(|id| Event { id, tags: vec![format!("tag-{id}"); (id % 3) as usize] })
        .collect();

    let source = Create::of(events.clone()).into_source(&registry).unwrap();
    let bundles = source.split_into_bundles(40, &options).unwrap();

    assert!(bundles.len() > 1);
    assert_sources_equal_reference_source(&source, &bundles, &options).unwrap();
    assert_split_at_fraction_exhaustive(&source, &options).unwrap();
    assert_eq!(read_from_source(&source, &options).unwrap(), events);
}
