//! Testing crate
//!
//! Helpers that check the bounded source contract: bundles reproduce their parent,
//! and a dynamic split at any point either leaves the reader untouched or partitions
//! its range exactly, including when the split races the consuming thread.
//!
//! Assertion failures panic with a description of the offending split; read errors
//! are returned to the caller.

use igloo_common::{BoundedReader, BoundedSource, Options, Result, SplitControl};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// How many times each accepted split is replayed against a concurrently reading
/// consumer.
const CONCURRENT_REPETITIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedSplitOutcome {
    MustSucceedAndBeConsistent,
    MustFail,
    MustBeConsistentIfSucceeds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitAtFractionResult {
    pub num_primary_items: usize,
    pub num_residual_items: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExhaustiveSplitReport {
    pub attempts: usize,
    pub accepted: usize,
    pub concurrent_runs: usize,
}

pub fn read_from_source<T, S>(source: &S, _options: &Options) -> Result<Vec<T>>
where
    S: BoundedSource<T>,
{
    let mut reader = source.open()?;
    read_remaining_from_reader(&mut reader, false)
}

/// Reads up to `n` items, starting the reader if `n > 0`.
pub fn read_n_items_from_unstarted_reader<T, R>(reader: &mut R, n: usize) -> Result<Vec<T>>
where
    R: BoundedReader<T>,
{
    let mut items = Vec::with_capacity(n);
    for i in 0..n {
        let more = if i == 0 { reader.start()? } else { reader.advance()? };
        if !more {
            break;
        }
        items.push(reader.current()?);
    }
    Ok(items)
}

/// Reads everything left. A started reader's current item is assumed already consumed.
pub fn read_remaining_from_reader<T, R>(reader: &mut R, started: bool) -> Result<Vec<T>>
where
    R: BoundedReader<T>,
{
    let mut items = Vec::new();
    let mut more = if started { reader.advance()? } else { reader.start()? };
    while more {
        items.push(reader.current()?);
        more = reader.advance()?;
    }
    Ok(items)
}

/// Checks that `sources`, read in order, yield exactly what `reference` yields and
/// share its output coder.
pub fn assert_sources_equal_reference_source<T, S>(
    reference: &S,
    sources: &[S],
    options: &Options,
) -> Result<()>
where
    T: PartialEq + Debug,
    S: BoundedSource<T>,
{
    assert!(!sources.is_empty(), "splitting {reference:?} produced no sources");
    let reference_coder = reference.default_output_coder()?;
    let expected: Vec<T> = read_from_source(reference, options)?;

    let mut actual = Vec::with_capacity(expected.len());
    for (i, source) in sources.iter().enumerate() {
        let coder = source.default_output_coder()?;
        assert!(Arc::ptr_eq(&coder, &reference_coder), "bundle {i} ({source:?}) has a different coder");
        actual.extend(read_from_source::<T, S>(source, options)?);
    }
    assert_eq!(actual, expected, "bundles do not reproduce {reference:?}");
    Ok(())
}

/// Reads `num_items_to_read_before_split` items, splits at `fraction`, and checks the
/// outcome. Returns the split sizes when the split was accepted.
pub fn assert_split_at_fraction_behavior<T, S>(
    source: &S,
    num_items_to_read_before_split: usize,
    fraction: f64,
    expected_outcome: ExpectedSplitOutcome,
    options: &Options,
) -> Result<Option<SplitAtFractionResult>>
where
    T: PartialEq + Debug,
    S: BoundedSource<T>,
{
    let n = num_items_to_read_before_split;
    let expected: Vec<T> = read_from_source(source, options)?;
    let mut reader = source.open()?;
    let mut items: Vec<T> = read_n_items_from_unstarted_reader(&mut reader, n)?;

    let residual = reader.split_at_fraction(fraction);
    match (expected_outcome, &residual) {
        (ExpectedSplitOutcome::MustSucceedAndBeConsistent, None) => {
            panic!("split of {source:?} at {fraction} after {n} items was rejected")
        }
        (ExpectedSplitOutcome::MustFail, Some(residual)) => {
            panic!("split of {source:?} at {fraction} after {n} items produced {residual:?}")
        }
        _ => {}
    }

    let remaining: Vec<T> = read_remaining_from_reader(&mut reader, n > 0)?;
    items.extend(remaining);
    let Some(residual) = residual else {
        assert_eq!(items, expected, "rejected split at {fraction} after {n} items changed the reader");
        return Ok(None);
    };

    let primary_items: Vec<T> = read_from_source(&reader.current_source(), options)?;
    let residual_items: Vec<T> = read_from_source(&residual, options)?;
    assert_eq!(
        items, primary_items,
        "reader split at {fraction} after {n} items disagrees with its primary source"
    );

    let result = SplitAtFractionResult {
        num_primary_items: primary_items.len(),
        num_residual_items: residual_items.len(),
    };
    let mut combined = primary_items;
    combined.extend(residual_items);
    assert_eq!(
        combined, expected,
        "primary and residual of split at {fraction} after {n} items do not partition {source:?}"
    );
    Ok(Some(result))
}

/// Splits from a second thread while the consumer keeps reading. Whatever the
/// interleaving, the consumer's items followed by the residual's must equal the source.
/// Returns whether the split was accepted.
pub fn assert_split_at_fraction_concurrent<T, S>(
    source: &S,
    num_items_to_read_before_split: usize,
    fraction: f64,
    options: &Options,
) -> Result<bool>
where
    T: PartialEq + Debug,
    S: BoundedSource<T>,
{
    let n = num_items_to_read_before_split;
    let expected: Vec<T> = read_from_source(source, options)?;
    let mut reader = source.open()?;
    let mut items: Vec<T> = read_n_items_from_unstarted_reader(&mut reader, n)?;
    let handle = reader.split_handle();

    let (remaining, residual) = std::thread::scope(|scope| {
        let splitter = scope.spawn(move || handle.split_at_fraction(fraction));
        let remaining: Result<Vec<T>> = read_remaining_from_reader(&mut reader, n > 0);
        (remaining, splitter.join())
    });
    let residual = residual.unwrap_or_else(|panic| std::panic::resume_unwind(panic));

    items.extend(remaining?);
    let accepted = residual.is_some();
    if let Some(residual) = residual {
        items.extend(read_from_source::<T, S>(&residual, options)?);
    }
    assert_eq!(
        items, expected,
        "concurrent split at {fraction} after {n} items (accepted: {accepted}) lost or duplicated items"
    );
    Ok(accepted)
}

/// Fractions on a grid four times finer than the element spacing, endpoints included.
fn fraction_grid(total: usize) -> Vec<f64> {
    let steps = total.max(1) * 4;
    (0..=steps).map(|k| k as f64 / steps as f64).collect()
}

/// Tries a split at every position and on a dense grid of fractions, replaying each
/// accepted split concurrently.
pub fn assert_split_at_fraction_exhaustive<T, S>(
    source: &S,
    options: &Options,
) -> Result<ExhaustiveSplitReport>
where
    T: PartialEq + Debug,
    S: BoundedSource<T>,
{
    let total = read_from_source::<T, S>(source, options)?.len();
    let mut report = ExhaustiveSplitReport::default();

    for n in 0..=total {
        for fraction in fraction_grid(total) {
            report.attempts += 1;
            let outcome = assert_split_at_fraction_behavior::<T, S>(
                source,
                n,
                fraction,
                ExpectedSplitOutcome::MustBeConsistentIfSucceeds,
                options,
            )?;
            if outcome.is_none() {
                continue;
            }
            report.accepted += 1;
            for _ in 0..CONCURRENT_REPETITIONS {
                assert_split_at_fraction_concurrent::<T, S>(source, n, fraction, options)?;
                report.concurrent_runs += 1;
            }
        }
    }

    debug!(
        total,
        attempts = report.attempts,
        accepted = report.accepted,
        concurrent_runs = report.concurrent_runs,
        "exhaustive split check finished"
    );
    Ok(report)
}
