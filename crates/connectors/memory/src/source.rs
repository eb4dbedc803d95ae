use crate::buffer::EncodedBuffer;
use crate::reader::InMemoryReader;
use crate::BoundedSource;
use igloo_common::{CoderRef, Options, Result};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A view over elements `[start, end)` of a shared [`EncodedBuffer`].
///
/// Sources are immutable. Splitting never changes a source; it produces new sources
/// over disjoint sub-ranges of the same buffer.
pub struct InMemorySource<T> {
    buffer: Arc<EncodedBuffer<T>>,
    start: usize,
    end: usize,
}

impl<T> InMemorySource<T> {
    /// Encodes `values` with `coder` and returns a source over all of them.
    pub fn from_values<I>(values: I, coder: CoderRef<T>) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
    {
        let buffer = EncodedBuffer::encode(values, coder)?;
        Ok(Self::from_buffer(Arc::new(buffer)))
    }

    pub fn from_buffer(buffer: Arc<EncodedBuffer<T>>) -> Self {
        let end = buffer.len();
        Self { buffer, start: 0, end }
    }

    pub(crate) fn with_range(&self, start: usize, end: usize) -> Self {
        debug_assert!(self.start <= start && start <= end && end <= self.buffer.len());
        Self { buffer: Arc::clone(&self.buffer), start, end }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn buffer(&self) -> &Arc<EncodedBuffer<T>> {
        &self.buffer
    }

    /// Number of elements per bundle for a desired bundle size, never below one.
    fn elements_per_bundle(&self, desired_bundle_size_bytes: u64) -> usize {
        let average = self.buffer.average_element_size();
        if average <= 0.0 {
            return self.len().max(1);
        }
        let per_bundle = (desired_bundle_size_bytes as f64 / average).floor();
        if per_bundle >= self.len() as f64 {
            self.len().max(1)
        } else {
            (per_bundle as usize).max(1)
        }
    }
}

impl<T> Clone for InMemorySource<T> {
    fn clone(&self) -> Self {
        Self { buffer: Arc::clone(&self.buffer), start: self.start, end: self.end }
    }
}

impl<T> fmt::Debug for InMemorySource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemorySource")
            .field("start", &self.start)
            .field("end", &self.end)
            .field("buffer", &self.buffer)
            .finish()
    }
}

impl<T: 'static> BoundedSource<T> for InMemorySource<T> {
    type Reader = InMemoryReader<T>;

    fn split_into_bundles(
        &self,
        desired_bundle_size_bytes: u64,
        _options: &Options,
    ) -> Result<Vec<Self>> {
        if desired_bundle_size_bytes == 0 || self.is_empty() {
            return Ok(vec![self.clone()]);
        }

        let per_bundle = self.elements_per_bundle(desired_bundle_size_bytes);
        let bundles: Vec<Self> = (self.start..self.end)
            .step_by(per_bundle)
            .map(|bundle_start| {
                self.with_range(bundle_start, (bundle_start + per_bundle).min(self.end))
            })
            .collect();

        debug!(
            start = self.start,
            end = self.end,
            desired_bundle_size_bytes,
            per_bundle,
            bundles = bundles.len(),
            "split source into bundles"
        );
        Ok(bundles)
    }

    fn estimated_size_bytes(&self, _options: &Options) -> Result<u64> {
        Ok(self.buffer.estimated_bytes(self.len()))
    }

    fn produces_sorted_keys(&self, _options: &Options) -> Result<bool> {
        Ok(false)
    }

    fn default_output_coder(&self) -> Result<CoderRef<T>> {
        Ok(Arc::clone(self.buffer.coder()))
    }

    fn open(&self) -> Result<InMemoryReader<T>> {
        Ok(InMemoryReader::new(self.clone()))
    }
}
