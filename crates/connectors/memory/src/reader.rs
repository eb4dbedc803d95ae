use crate::source::InMemorySource;
use crate::{BoundedReader, SplitControl};
use igloo_common::{Error, Result};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

/// Position and live end of a reader. Both live behind one lock so a dynamic split
/// can never race past the consumer.
#[derive(Debug)]
struct ReadRange {
    /// Index of the element last returned, `None` before `start()`.
    position: Option<usize>,
    live_end: usize,
    done: bool,
}

type SharedRange = Arc<Mutex<ReadRange>>;

fn lock(range: &Mutex<ReadRange>) -> MutexGuard<'_, ReadRange> {
    // The guarded state is plain integers, so a poisoned lock is still consistent.
    range.lock().unwrap_or_else(PoisonError::into_inner)
}

fn fraction_consumed<T>(source: &InMemorySource<T>, range: &Mutex<ReadRange>) -> Option<f64> {
    let state = lock(range);
    if state.done {
        return Some(1.0);
    }
    let position = state.position?;
    let start = source.start();
    Some((position - start + 1) as f64 / (state.live_end - start) as f64)
}

fn split_at_fraction<T>(
    source: &InMemorySource<T>,
    range: &Mutex<ReadRange>,
    fraction: f64,
) -> Option<InMemorySource<T>> {
    if !(fraction > 0.0 && fraction < 1.0) {
        debug!(fraction, "rejecting split: fraction outside (0, 1)");
        return None;
    }

    let start = source.start();
    let mut state = lock(range);
    let position = match state.position {
        Some(position) if !state.done => position,
        _ => {
            debug!(fraction, done = state.done, "rejecting split: reader not positioned");
            return None;
        }
    };
    let live_end = state.live_end;
    let offset = (fraction * (live_end - start) as f64).round() as usize;
    let proposed_end = (start + offset).clamp(start, live_end);

    if proposed_end <= position + 1 || proposed_end >= live_end {
        debug!(fraction, position, proposed_end, live_end, "rejecting split");
        return None;
    }

    state.live_end = proposed_end;
    drop(state);

    debug!(fraction, position, proposed_end, live_end, "accepted split");
    Some(source.with_range(proposed_end, live_end))
}

/// Sequential reader over an [`InMemorySource`].
pub struct InMemoryReader<T> {
    source: InMemorySource<T>,
    range: SharedRange,
}

impl<T> InMemoryReader<T> {
    pub(crate) fn new(source: InMemorySource<T>) -> Self {
        let range = Arc::new(Mutex::new(ReadRange {
            position: None,
            live_end: source.end(),
            done: false,
        }));
        Self { source, range }
    }

    /// The source this reader was opened on, before any dynamic split.
    pub fn source(&self) -> &InMemorySource<T> {
        &self.source
    }

    /// Exclusive end of the range this reader will still read.
    pub fn live_end(&self) -> usize {
        lock(&self.range).live_end
    }
}

impl<T: 'static> BoundedReader<T> for InMemoryReader<T> {
    type Source = InMemorySource<T>;
    type Handle = SplitHandle<T>;

    fn start(&mut self) -> Result<bool> {
        let mut state = lock(&self.range);
        if state.position.is_some() || state.done {
            return Err(Error::Execution("reader already started".to_string()));
        }
        if self.source.start() < state.live_end {
            state.position = Some(self.source.start());
            Ok(true)
        } else {
            state.done = true;
            Ok(false)
        }
    }

    fn advance(&mut self) -> Result<bool> {
        let mut state = lock(&self.range);
        if state.done {
            return Ok(false);
        }
        let position = state.position.ok_or(Error::NoCurrent)?;
        if position + 1 < state.live_end {
            state.position = Some(position + 1);
            Ok(true)
        } else {
            trace!(position, live_end = state.live_end, "reader exhausted");
            state.done = true;
            Ok(false)
        }
    }

    fn current(&self) -> Result<T> {
        let position = {
            let state = lock(&self.range);
            match state.position {
                Some(position) if !state.done => position,
                _ => return Err(Error::NoCurrent),
            }
        };
        self.source.buffer().decode(position)
    }

    fn split_at_fraction(&self, fraction: f64) -> Option<InMemorySource<T>> {
        split_at_fraction(&self.source, &self.range, fraction)
    }

    fn fraction_consumed(&self) -> Option<f64> {
        fraction_consumed(&self.source, &self.range)
    }

    fn current_source(&self) -> InMemorySource<T> {
        self.source.with_range(self.source.start(), self.live_end())
    }

    fn split_handle(&self) -> SplitHandle<T> {
        SplitHandle { source: self.source.clone(), range: Arc::clone(&self.range) }
    }
}

impl<T> fmt::Debug for InMemoryReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryReader")
            .field("source", &self.source)
            .field("range", &*lock(&self.range))
            .finish()
    }
}

/// Control-thread view of an [`InMemoryReader`].
///
/// The handle is `Send + Sync` for any element type. Once the reader is exhausted
/// every split is rejected.
pub struct SplitHandle<T> {
    source: InMemorySource<T>,
    range: SharedRange,
}

impl<T> SplitHandle<T> {
    pub fn live_end(&self) -> usize {
        lock(&self.range).live_end
    }
}

impl<T> SplitControl<InMemorySource<T>> for SplitHandle<T> {
    fn split_at_fraction(&self, fraction: f64) -> Option<InMemorySource<T>> {
        split_at_fraction(&self.source, &self.range, fraction)
    }

    fn fraction_consumed(&self) -> Option<f64> {
        fraction_consumed(&self.source, &self.range)
    }
}

impl<T> Clone for SplitHandle<T> {
    fn clone(&self) -> Self {
        Self { source: self.source.clone(), range: Arc::clone(&self.range) }
    }
}

impl<T> fmt::Debug for SplitHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitHandle").field("range", &*lock(&self.range)).finish()
    }
}
