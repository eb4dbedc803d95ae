//! Element coders.
//!
//! Every element of a source is encoded on its own, with no framing shared between
//! elements, so a coder only ever sees the bytes of exactly one value.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoderError {
    #[error("expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
    #[error("varint does not fit in {0} bits")]
    Overflow(u32),
    #[error("invalid null marker byte {0:#04x}")]
    InvalidMarker(u8),
    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("{0}")]
    Custom(String),
}

/// Converts values of `T` to and from their byte representation.
pub trait Coder<T>: Send + Sync + fmt::Debug {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CoderError>;

    fn decode(&self, bytes: &[u8]) -> Result<T, CoderError>;
}

pub type CoderRef<T> = Arc<dyn Coder<T>>;

impl<T, C: Coder<T> + ?Sized> Coder<T> for Arc<C> {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CoderError> {
        (**self).encode(value)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CoderError> {
        (**self).decode(bytes)
    }
}

/// Fixed four byte big-endian `i32`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BigEndianI32Coder;

impl Coder<i32> for BigEndianI32Coder {
    fn encode(&self, value: &i32) -> Result<Vec<u8>, CoderError> {
        Ok(value.to_be_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<i32, CoderError> {
        let arr: [u8; 4] = bytes
            .try_into()
            .map_err(|_| CoderError::Truncated { expected: 4, actual: bytes.len() })?;
        Ok(i32::from_be_bytes(arr))
    }
}

fn write_varint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_varint(bytes: &[u8], bits: u32) -> Result<u64, CoderError> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    for (i, byte) in bytes.iter().enumerate() {
        if shift >= bits {
            return Err(CoderError::Overflow(bits));
        }
        let payload = u64::from(byte & 0x7f);
        // the last group may only carry the bits that are left
        if shift + 7 > bits && payload >> (bits - shift) != 0 {
            return Err(CoderError::Overflow(bits));
        }
        result |= payload << shift;
        if byte & 0x80 == 0 {
            let rest = bytes.len() - i - 1;
            if rest > 0 {
                return Err(CoderError::TrailingBytes(rest));
            }
            return Ok(result);
        }
        shift += 7;
    }
    Err(CoderError::Truncated { expected: bytes.len() + 1, actual: bytes.len() })
}

/// LEB128 encoding of an `i32` reinterpreted as `u32`; negative values take five bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VarIntCoder;

impl Coder<i32> for VarIntCoder {
    fn encode(&self, value: &i32) -> Result<Vec<u8>, CoderError> {
        let mut out = Vec::with_capacity(5);
        write_varint(u64::from(*value as u32), &mut out);
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<i32, CoderError> {
        Ok(read_varint(bytes, 32)? as u32 as i32)
    }
}

/// LEB128 encoding of an `i64` reinterpreted as `u64`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VarLongCoder;

impl Coder<i64> for VarLongCoder {
    fn encode(&self, value: &i64) -> Result<Vec<u8>, CoderError> {
        let mut out = Vec::with_capacity(10);
        write_varint(*value as u64, &mut out);
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<i64, CoderError> {
        Ok(read_varint(bytes, 64)? as i64)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StringUtf8Coder;

impl Coder<String> for StringUtf8Coder {
    fn encode(&self, value: &String) -> Result<Vec<u8>, CoderError> {
        Ok(value.as_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, CoderError> {
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BytesCoder;

impl Coder<Vec<u8>> for BytesCoder {
    fn encode(&self, value: &Vec<u8>) -> Result<Vec<u8>, CoderError> {
        Ok(value.clone())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CoderError> {
        Ok(bytes.to_vec())
    }
}

const NULL_MARKER: u8 = 0;
const PRESENT_MARKER: u8 = 1;

/// Wraps another coder so that `None` can be encoded. One marker byte precedes the
/// inner encoding.
#[derive(Debug, Clone, Default)]
pub struct NullableCoder<C> {
    inner: C,
}

impl<C> NullableCoder<C> {
    pub fn of(inner: C) -> Self {
        Self { inner }
    }
}

impl<T, C: Coder<T>> Coder<Option<T>> for NullableCoder<C> {
    fn encode(&self, value: &Option<T>) -> Result<Vec<u8>, CoderError> {
        match value {
            None => Ok(vec![NULL_MARKER]),
            Some(v) => {
                let encoded = self.inner.encode(v)?;
                let mut out = Vec::with_capacity(encoded.len() + 1);
                out.push(PRESENT_MARKER);
                out.extend_from_slice(&encoded);
                Ok(out)
            }
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<Option<T>, CoderError> {
        match bytes.split_first() {
            None => Err(CoderError::Truncated { expected: 1, actual: 0 }),
            Some((&NULL_MARKER, [])) => Ok(None),
            Some((&NULL_MARKER, rest)) => Err(CoderError::TrailingBytes(rest.len())),
            Some((&PRESENT_MARKER, rest)) => self.inner.decode(rest).map(Some),
            Some((&marker, _)) => Err(CoderError::InvalidMarker(marker)),
        }
    }
}

/// Coder for any serde type, using bincode.
pub struct BincodeCoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeCoder<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for BincodeCoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BincodeCoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BincodeCoder<{}>", std::any::type_name::<T>())
    }
}

impl<T: Serialize + DeserializeOwned> Coder<T> for BincodeCoder<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>, CoderError> {
        Ok(bincode::serialize(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CoderError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
