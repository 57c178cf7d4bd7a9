//! Method registry
//!
//! Built once before the server starts; the server only ever reads it afterwards.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::handler::{Handler, MethodContext};

#[derive(Clone)]
pub struct Registration {
    handler: Arc<dyn Handler>,
    context: Option<MethodContext>,
}

impl Registration {
    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub fn context(&self) -> Option<&MethodContext> {
        self.context.as_ref()
    }
}

#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Registration>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`. A later registration for the same name replaces
    /// the earlier one.
    pub fn register(&mut self, name: impl Into<String>, handler: impl Handler) -> &mut Self {
        self.insert(name.into(), Arc::new(handler), None)
    }

    /// Register a handler together with an opaque context value it can read back
    /// through [`crate::CallContext::data`].
    pub fn register_with_context<C>(
        &mut self,
        name: impl Into<String>,
        handler: impl Handler,
        context: C,
    ) -> &mut Self
    where
        C: Any + Send + Sync,
    {
        self.insert(name.into(), Arc::new(handler), Some(Arc::new(context)))
    }

    fn insert(
        &mut self,
        name: String,
        handler: Arc<dyn Handler>,
        context: Option<MethodContext>,
    ) -> &mut Self {
        let registration = Registration { handler, context };
        if self.methods.insert(name.clone(), registration).is_some() {
            tracing::debug!("Replaced handler for method '{}'", name);
        } else {
            tracing::debug!("Registered method '{}'", name);
        }
        self
    }

    /// Remove a method. Returns whether it was registered.
    pub fn deregister(&mut self, name: &str) -> bool {
        self.methods.remove(name).is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<&Registration> {
        self.methods.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.method_names())
            .finish()
    }
}
