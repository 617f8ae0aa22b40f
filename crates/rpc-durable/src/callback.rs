use std::collections::HashMap;

use serde_json::Value;

use crate::storage::PendingCall;

/// Context handed to a callback alongside its payload: the original call
/// record and how long it took to resolve.
pub struct CallContext {
    pub call: PendingCall,
    pub latency_ms: i64,
}

/// What a durable call resolved to. Error frames invoke the same callback as
/// success, carrying this variant instead — the source conflates success and
/// error continuations into one callback slot, and this preserves that shape.
pub enum CallbackPayload {
    Success(Value),
    Failure {
        code: i32,
        message: String,
        data: Option<Value>,
    },
}

pub type Callback = Box<dyn Fn(CallbackPayload, CallContext) + Send + Sync>;

/// String-keyed table of callable continuations on the host, standing in
/// for the source's reflective "call a method on the host object by name".
/// Hosts register explicitly; there is no reflection here.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, Callback>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(mut self, name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(CallbackPayload, CallContext) + Send + Sync + 'static,
    {
        self.callbacks.insert(name.into(), Box::new(callback));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Callback> {
        self.callbacks.get(name)
    }
}
