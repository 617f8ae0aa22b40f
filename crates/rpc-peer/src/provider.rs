use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A local method implementation: takes validated params, returns a value to
/// be validated against the method's output schema before being sent back as
/// a `Response`, or an error message to be sent back as an `ErrorMsg`.
pub type Handler = Box<dyn Fn(Value) -> BoxFuture<Result<Value, String>> + Send + Sync>;

/// The Rust expression of the source's `provider[method]` string-keyed
/// dispatch: local methods registered explicitly by name rather than
/// resolved by reflection.
#[derive(Default)]
pub struct Provider {
    handlers: HashMap<String, Handler>,
}

impl Provider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an async handler for `method`. Replaces any prior handler
    /// of the same name.
    pub fn register<F, Fut>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.handlers
            .insert(method.into(), Box::new(move |params| Box::pin(handler(params))));
        self
    }

    pub fn get(&self, method: &str) -> Option<&Handler> {
        self.handlers.get(method)
    }
}
