use crate::source::InMemorySource;
use igloo_common::{CoderRef, CoderRegistry, Result};
use tracing::debug;

/// Builds an [`InMemorySource`] from a list of values.
///
/// Without an explicit coder the element type's default is looked up in a
/// [`CoderRegistry`]; failing that lookup fails construction, before any bundle exists.
pub struct Create<T> {
    values: Vec<T>,
    coder: Option<CoderRef<T>>,
}

impl<T: 'static> Create<T> {
    pub fn of<I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        Self { values: values.into_iter().collect(), coder: None }
    }

    pub fn empty() -> Self {
        Self { values: Vec::new(), coder: None }
    }

    pub fn with_coder(mut self, coder: CoderRef<T>) -> Self {
        self.coder = Some(coder);
        self
    }

    /// Resolves the coder and encodes every value.
    pub fn into_source(self, registry: &CoderRegistry) -> Result<InMemorySource<T>> {
        let coder = match self.coder {
            Some(coder) => coder,
            None => registry.resolve::<T>()?,
        };
        debug!(elements = self.values.len(), coder = ?coder, "encoding in-memory source");
        InMemorySource::from_values(self.values, coder)
    }
}
