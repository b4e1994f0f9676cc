//! Per-execution-context handle pooling.
//!
//! Some transports are not safe for concurrent use from multiple execution
//! contexts. The [`HandlePool`] keeps one handle per context id, lazily
//! constructed on first access and cached for the context's lifetime. No
//! handle is ever shared across contexts, and there is no hidden global
//! state: the pool itself is an explicit value the caller owns.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;

/// Identifier of one execution context (worker, thread, task).
pub type ContextId = u64;

/// Builds a handle for a context on first access.
pub type HandleFactory<T> = dyn Fn(ContextId) -> Result<Arc<T>> + Send + Sync;

/// One lazily-built handle per execution context.
pub struct HandlePool<T> {
    handles: RwLock<HashMap<ContextId, Arc<T>>>,
    factory: Box<HandleFactory<T>>,
}

impl<T> std::fmt::Debug for HandlePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlePool")
            .field("contexts", &self.handles.read().len())
            .finish()
    }
}

impl<T> HandlePool<T> {
    /// Create a pool with the given factory.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(ContextId) -> Result<Arc<T>> + Send + Sync + 'static,
    {
        Self {
            handles: RwLock::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// Get the handle for a context, building it on first access.
    pub fn get(&self, context: ContextId) -> Result<Arc<T>> {
        if let Some(handle) = self.handles.read().get(&context) {
            return Ok(handle.clone());
        }

        let mut handles = self.handles.write();
        // A racing context may have built it between the locks.
        if let Some(handle) = handles.get(&context) {
            return Ok(handle.clone());
        }
        let handle = (self.factory)(context)?;
        handles.insert(context, handle.clone());
        Ok(handle)
    }

    /// Drop the handle cached for a context, if any.
    pub fn evict(&self, context: ContextId) {
        self.handles.write().remove(&context);
    }

    /// Number of contexts with a cached handle.
    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    /// Check whether no context holds a handle.
    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }
}
