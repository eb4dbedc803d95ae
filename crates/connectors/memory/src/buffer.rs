use igloo_common::{CoderRef, Error, Result};
use std::fmt;

/// Immutable, per-element encoded copy of a source's values.
///
/// Index `i` holds the encoding of the `i`-th input value for the lifetime of the
/// buffer. Elements carry no framing, so ranges are addressed by element count only.
pub struct EncodedBuffer<T> {
    elements: Vec<Box<[u8]>>,
    total_bytes: u64,
    coder: CoderRef<T>,
}

impl<T> EncodedBuffer<T> {
    /// Encodes every value eagerly, in order.
    pub fn encode<I>(values: I, coder: CoderRef<T>) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
    {
        let elements = values
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                coder
                    .encode(&value)
                    .map(Vec::into_boxed_slice)
                    .map_err(|source| Error::Encode { index, source })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_elements(elements, coder))
    }

    /// Wraps bytes that were already produced by `coder`.
    pub fn from_encoded<I>(encoded: I, coder: CoderRef<T>) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self::from_elements(encoded.into_iter().map(Vec::into_boxed_slice).collect(), coder)
    }

    fn from_elements(elements: Vec<Box<[u8]>>, coder: CoderRef<T>) -> Self {
        let total_bytes = elements.iter().map(|e| e.len() as u64).sum();
        Self { elements, total_bytes, coder }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Mean encoded size; zero for an empty buffer.
    pub fn average_element_size(&self) -> f64 {
        if self.elements.is_empty() {
            0.0
        } else {
            self.total_bytes as f64 / self.elements.len() as f64
        }
    }

    /// Size estimate for `count` elements under the uniform-size approximation.
    pub fn estimated_bytes(&self, count: usize) -> u64 {
        if self.elements.is_empty() {
            return 0;
        }
        (u128::from(self.total_bytes) * count as u128 / self.elements.len() as u128) as u64
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.elements.get(index).map(|e| &e[..])
    }

    pub fn coder(&self) -> &CoderRef<T> {
        &self.coder
    }

    pub fn decode(&self, index: usize) -> Result<T> {
        let bytes = self.get(index).ok_or_else(|| {
            Error::Execution(format!("element {index} outside buffer of {}", self.len()))
        })?;
        self.coder.decode(bytes).map_err(|source| Error::Decode { index, source })
    }
}

impl<T> fmt::Debug for EncodedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedBuffer")
            .field("len", &self.elements.len())
            .field("total_bytes", &self.total_bytes)
            .field("coder", &self.coder)
            .finish()
    }
}
