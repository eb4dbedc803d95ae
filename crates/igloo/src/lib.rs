//! Igloo
//!
//! Re-exports the pieces needed to build, split and execute in-memory sources.

pub use igloo_common as common;
pub use igloo_connector_memory as memory;
pub use igloo_worker as worker;

pub use igloo_common::{
    BoundedReader, BoundedSource, Coder, CoderRef, CoderRegistry, Error, Options, Result,
    SplitControl,
};
pub use igloo_connector_memory::{Create, InMemoryReader, InMemorySource, SplitHandle};
pub use igloo_worker::{BundleExecutor, ExecutionReport};
