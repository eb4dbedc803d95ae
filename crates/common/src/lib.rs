//! Common crate
//!
//! Shared coders, options, and error handling for Igloo sources.
//!
//! # Example
//! ```rust
//! use igloo_common::{Coder, StringUtf8Coder};
//! let coder = StringUtf8Coder;
//! let bytes = coder.encode(&"spam".to_string()).unwrap();
//! assert_eq!(coder.decode(&bytes).unwrap(), "spam");
//! ```

pub mod coder;
pub mod error;
pub mod options;
pub mod registry;
pub mod source;

pub use coder::{
    BigEndianI32Coder, BincodeCoder, BytesCoder, Coder, CoderError, CoderRef, NullableCoder,
    StringUtf8Coder, VarIntCoder, VarLongCoder,
};
pub use error::{Error, Result};
pub use options::Options;
pub use registry::CoderRegistry;
pub use source::{BoundedReader, BoundedSource, SplitControl};
