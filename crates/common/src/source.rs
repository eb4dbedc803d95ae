//! Capability traits shared by every bounded source variant.

use crate::coder::CoderRef;
use crate::error::Result;
use crate::options::Options;
use std::fmt;

/// A finite, ordered collection of records that can be split into bundles.
pub trait BoundedSource<T>: Send + Sync + fmt::Debug {
    type Reader: BoundedReader<T, Source = Self>;

    /// Splits into contiguous bundles of roughly `desired_bundle_size_bytes` each.
    /// Reading the bundles in order yields exactly the records of `self`.
    fn split_into_bundles(
        &self,
        desired_bundle_size_bytes: u64,
        options: &Options,
    ) -> Result<Vec<Self>>
    where
        Self: Sized;

    fn estimated_size_bytes(&self, options: &Options) -> Result<u64>;

    fn produces_sorted_keys(&self, options: &Options) -> Result<bool>;

    fn default_output_coder(&self) -> Result<CoderRef<T>>;

    fn open(&self) -> Result<Self::Reader>;
}

/// A cursor over one bundle.
///
/// `start`, `advance` and `current` belong to the consuming thread. Dynamic splits can
/// come from another thread through [`BoundedReader::split_handle`]; a reader's range
/// only ever shrinks.
pub trait BoundedReader<T> {
    type Source: BoundedSource<T>;
    type Handle: SplitControl<Self::Source> + Send + Sync + 'static;

    /// Positions on the first record. Returns false if there is none.
    fn start(&mut self) -> Result<bool>;

    /// Moves to the next record. Returns false once the live range is exhausted.
    fn advance(&mut self) -> Result<bool>;

    fn current(&self) -> Result<T>;

    /// Narrows the reader at `fraction` of its live range and returns the residual,
    /// or `None` if the split is rejected.
    fn split_at_fraction(&self, fraction: f64) -> Option<Self::Source>;

    fn fraction_consumed(&self) -> Option<f64>;

    /// The source covering what this reader will read, after any accepted splits.
    fn current_source(&self) -> Self::Source;

    fn split_handle(&self) -> Self::Handle;
}

/// Dynamic split access to a live reader from a thread other than its consumer.
pub trait SplitControl<S> {
    fn split_at_fraction(&self, fraction: f64) -> Option<S>;

    fn fraction_consumed(&self) -> Option<f64>;
}
