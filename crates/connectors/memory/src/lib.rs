//! In-memory connector
//!
//! A bounded source backed by a pre-supplied sequence of values. Values are encoded
//! once at construction; bundles and readers share the encoded buffer and decode on
//! demand.
//!
//! # Example
//! ```rust
//! use igloo_common::{BigEndianI32Coder, CoderRegistry, Options};
//! use igloo_connector_memory::{BoundedReader, BoundedSource, Create};
//! use std::sync::Arc;
//!
//! let source = Create::of(1..=8i32)
//!     .with_coder(Arc::new(BigEndianI32Coder))
//!     .into_source(&CoderRegistry::standard())
//!     .unwrap();
//! let bundles = source.split_into_bundles(12, &Options::default()).unwrap();
//! assert_eq!(bundles.len(), 3);
//!
//! let mut reader = bundles[0].open().unwrap();
//! assert!(reader.start().unwrap());
//! assert_eq!(reader.current().unwrap(), 1);
//! ```

pub mod buffer;
pub mod create;
pub mod reader;
pub mod source;

pub use buffer::EncodedBuffer;
pub use create::Create;
pub use igloo_common::source::{BoundedReader, BoundedSource, SplitControl};
pub use reader::{InMemoryReader, SplitHandle};
pub use source::InMemorySource;
