use crate::error::Result;
use igloo_common::{BoundedReader, BoundedSource, Error, Options, SplitControl};
use igloo_connector_memory::{InMemoryReader, InMemorySource, SplitHandle};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One bundle as it finished: its final range after any dynamic splits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSummary {
    pub id: Uuid,
    pub start: usize,
    pub end: usize,
    pub records: usize,
    /// Whether the bundle was a residual carved out of a running reader.
    pub dynamic: bool,
}

#[derive(Debug)]
pub struct ExecutionReport<T> {
    pub values: Vec<T>,
    /// Bundles in range order.
    pub bundles: Vec<BundleSummary>,
    pub dynamic_splits: usize,
}

struct PendingBundle<T> {
    source: InMemorySource<T>,
    dynamic: bool,
}

struct FinishedBundle<T> {
    summary: BundleSummary,
    values: Vec<T>,
}

type BundleOutcome<T> = (Uuid, igloo_common::Result<(InMemorySource<T>, Vec<T>)>);

/// Raises the abort flag when `run` returns, however it returns. Blocking readers
/// cannot be aborted from outside, so they poll the flag between elements.
struct AbortOnDrop(Arc<AtomicBool>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Reads an [`InMemorySource`] as parallel bundles on blocking tasks, rebalancing
/// work onto idle slots by splitting the slowest running reader.
#[derive(Debug, Clone)]
pub struct BundleExecutor {
    options: Options,
}

impl BundleExecutor {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    /// Runs every bundle of `source` to completion. The values come back in source
    /// order; the first read failure aborts the run.
    pub async fn run<T>(&self, source: InMemorySource<T>) -> Result<ExecutionReport<T>>
    where
        T: Send + 'static,
    {
        let parallelism = self.options.max_parallelism.max(1);
        let bundles =
            source.split_into_bundles(self.options.desired_bundle_size_bytes, &self.options)?;
        info!(
            elements = source.len(),
            bundles = bundles.len(),
            parallelism,
            "starting bundle execution"
        );

        let permits = Arc::new(Semaphore::new(parallelism));
        let mut queue: VecDeque<PendingBundle<T>> = bundles
            .into_iter()
            .map(|source| PendingBundle { source, dynamic: false })
            .collect();
        let mut active: HashMap<Uuid, (SplitHandle<T>, bool)> = HashMap::new();
        let mut tasks: JoinSet<BundleOutcome<T>> = JoinSet::new();
        let mut finished: Vec<FinishedBundle<T>> = Vec::new();
        let mut dynamic_splits = 0;
        let abort = AbortOnDrop(Arc::new(AtomicBool::new(false)));

        let period = Duration::from_millis(self.options.rebalance_interval_ms.max(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            while !queue.is_empty() {
                let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                    break;
                };
                let Some(bundle) = queue.pop_front() else {
                    break;
                };
                let id = Uuid::new_v4();
                let mut reader = bundle.source.open()?;
                active.insert(id, (reader.split_handle(), bundle.dynamic));
                debug!(
                    %id,
                    start = bundle.source.start(),
                    end = bundle.source.end(),
                    dynamic = bundle.dynamic,
                    "launching bundle"
                );
                let abort_flag = Arc::clone(&abort.0);
                tasks.spawn_blocking(move || {
                    let _permit = permit;
                    let outcome = read_bundle(&mut reader, &abort_flag)
                        .map(|values| (reader.current_source(), values));
                    (id, outcome)
                });
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { continue };
                    let (id, outcome) = joined?;
                    let dynamic = active.remove(&id).is_some_and(|(_, dynamic)| dynamic);
                    let (primary, values) = match outcome {
                        Ok(done) => done,
                        Err(err) => {
                            warn!(
                                %id,
                                error = %err,
                                running = tasks.len(),
                                "bundle failed, aborting execution"
                            );
                            return Err(err.into());
                        }
                    };
                    debug!(
                        %id,
                        start = primary.start(),
                        end = primary.end(),
                        records = values.len(),
                        "bundle finished"
                    );
                    finished.push(FinishedBundle {
                        summary: BundleSummary {
                            id,
                            start: primary.start(),
                            end: primary.end(),
                            records: values.len(),
                            dynamic,
                        },
                        values,
                    });
                }
                _ = ticker.tick() => {
                    if queue.is_empty() && permits.available_permits() > 0 {
                        if let Some(residual) = self.rebalance(&active) {
                            dynamic_splits += 1;
                            queue.push_back(PendingBundle { source: residual, dynamic: true });
                        }
                    }
                }
            }
        }

        finished.sort_by_key(|bundle| (bundle.summary.start, bundle.summary.end));
        let mut values = Vec::with_capacity(source.len());
        let mut summaries = Vec::with_capacity(finished.len());
        for bundle in finished {
            values.extend(bundle.values);
            summaries.push(bundle.summary);
        }
        info!(
            records = values.len(),
            bundles = summaries.len(),
            dynamic_splits,
            "bundle execution finished"
        );
        Ok(ExecutionReport { values, bundles: summaries, dynamic_splits })
    }

    /// Splits the least advanced running reader that has started.
    fn rebalance<T>(
        &self,
        active: &HashMap<Uuid, (SplitHandle<T>, bool)>,
    ) -> Option<InMemorySource<T>> {
        let (id, handle, consumed) = active
            .iter()
            .filter_map(|(id, (handle, _))| {
                let consumed = handle.fraction_consumed()?;
                (consumed < 1.0).then_some((id, handle, consumed))
            })
            .min_by(|a, b| a.2.total_cmp(&b.2))?;

        let residual = handle.split_at_fraction(self.options.dynamic_split_fraction)?;
        debug!(
            %id,
            consumed,
            residual_start = residual.start(),
            residual_end = residual.end(),
            "dynamically split bundle"
        );
        Some(residual)
    }
}

fn read_bundle<T: 'static>(
    reader: &mut InMemoryReader<T>,
    abort: &AtomicBool,
) -> igloo_common::Result<Vec<T>> {
    let mut values = Vec::new();
    let mut more = reader.start()?;
    while more {
        if abort.load(Ordering::Acquire) {
            return Err(Error::Execution("bundle aborted".to_string()));
        }
        values.push(reader.current()?);
        more = reader.advance()?;
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use igloo_common::BigEndianI32Coder;

    fn source_of(n: i32) -> InMemorySource<i32> {
        InMemorySource::from_values(0..n, Arc::new(BigEndianI32Coder)).unwrap()
    }

    #[tokio::test]
    async fn reads_static_bundles_in_order() {
        let options = Options::default()
            .with_desired_bundle_size_bytes(16)
            .with_max_parallelism(3)
            .with_rebalance_interval_ms(60_000);
        let report = BundleExecutor::new(options).run(source_of(10)).await.unwrap();

        assert_eq!(report.values, (0..10).collect::<Vec<_>>());
        let ranges: Vec<_> = report.bundles.iter().map(|b| (b.start, b.end)).collect();
        assert_eq!(ranges, vec![(0, 4), (4, 8), (8, 10)]);
        assert_eq!(report.dynamic_splits, 0);
        assert!(report.bundles.iter().all(|b| !b.dynamic));
    }

    #[tokio::test]
    async fn zero_parallelism_still_makes_progress() {
        let options = Options::default().with_desired_bundle_size_bytes(8).with_max_parallelism(0);
        let report = BundleExecutor::new(options).run(source_of(5)).await.unwrap();
        assert_eq!(report.values, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn read_bundle_stops_once_aborted() {
        let abort = AtomicBool::new(false);
        let mut reader = source_of(5).open().unwrap();
        assert_eq!(read_bundle(&mut reader, &abort).unwrap(), vec![0, 1, 2, 3, 4]);

        abort.store(true, Ordering::Release);
        let mut reader = source_of(5).open().unwrap();
        assert!(matches!(read_bundle(&mut reader, &abort), Err(Error::Execution(_))));
    }

    #[test]
    fn rebalance_skips_readers_that_have_not_started() {
        let executor = BundleExecutor::new(Options::default());
        let reader = source_of(10).open().unwrap();
        let mut active = HashMap::new();
        active.insert(Uuid::new_v4(), (reader.split_handle(), false));
        assert!(executor.rebalance(&active).is_none());
    }

    #[test]
    fn rebalance_picks_least_advanced_reader() {
        let executor = BundleExecutor::new(Options::default().with_dynamic_split_fraction(0.5));

        let mut ahead = source_of(10).open().unwrap();
        ahead.start().unwrap();
        for _ in 0..5 {
            ahead.advance().unwrap();
        }
        let mut behind = source_of(10).open().unwrap();
        behind.start().unwrap();

        let mut active = HashMap::new();
        active.insert(Uuid::new_v4(), (ahead.split_handle(), false));
        active.insert(Uuid::new_v4(), (behind.split_handle(), false));

        let residual = executor.rebalance(&active).unwrap();
        assert_eq!((residual.start(), residual.end()), (5, 10));
        assert_eq!(behind.live_end(), 5);
        assert_eq!(ahead.live_end(), 10);
    }
}
