use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::coder::{
    BytesCoder, CoderRef, NullableCoder, StringUtf8Coder, VarIntCoder, VarLongCoder,
};
use crate::error::{Error, Result};

/// Maps element types to their default coder.
///
/// Resolution is by exact type: a coder registered for `String` is not used for
/// `Option<String>` unless that type is registered as well.
#[derive(Default)]
pub struct CoderRegistry {
    coders: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl CoderRegistry {
    /// An empty registry that resolves nothing.
    pub fn new() -> Self {
        Self { coders: HashMap::new() }
    }

    /// A registry preloaded with coders for the common primitive types.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register::<i32>(Arc::new(VarIntCoder));
        registry.register::<i64>(Arc::new(VarLongCoder));
        registry.register::<String>(Arc::new(StringUtf8Coder));
        registry.register::<Vec<u8>>(Arc::new(BytesCoder));
        registry.register::<Option<String>>(Arc::new(NullableCoder::of(StringUtf8Coder)));
        registry
    }

    /// Registers `coder` as the default for `T`, replacing any previous entry.
    pub fn register<T: 'static>(&mut self, coder: CoderRef<T>) {
        debug!(element_type = type_name::<T>(), coder = ?coder, "registering default coder");
        self.coders.insert(TypeId::of::<T>(), Arc::new(coder));
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.coders.contains_key(&TypeId::of::<T>())
    }

    /// Returns the registered coder for `T`. Repeated calls return the same `Arc`.
    pub fn resolve<T: 'static>(&self) -> Result<CoderRef<T>> {
        self.coders
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<CoderRef<T>>())
            .cloned()
            .ok_or(Error::CoderResolution { type_name: type_name::<T>() })
    }
}

impl std::fmt::Debug for CoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoderRegistry").field("registered", &self.coders.len()).finish()
    }
}
