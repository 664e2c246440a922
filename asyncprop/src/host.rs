use crate::Watch;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Called by the host whenever a watched expression changes.
pub type WatchCallback<H> = Arc<dyn Fn(&H) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct WatchOptions {
    /// Compare nested values rather than identity.
    pub deep: bool,
    /// Run the callback once at registration time.
    pub immediate: bool,
}

impl WatchOptions {
    pub fn deep() -> Self {
        WatchOptions {
            deep: true,
            immediate: false,
        }
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }
}

/// Keeps a watch registration alive. Dropping it, or calling
/// [`unsubscribe`](Self::unsubscribe), stops the callbacks.
#[derive(Debug)]
pub struct WatchHandle {
    token: CancellationToken,
}

impl WatchHandle {
    pub fn new(token: CancellationToken) -> Self {
        WatchHandle { token }
    }

    /// A handle for a registration that needs no teardown.
    pub fn detached() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        WatchHandle { token }
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn unsubscribe(self) {
        self.token.cancel();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// The object that owns the state of async properties.
///
/// A host stores named fields, can broadcast named events, and offers a watch
/// primitive. This is all the binding layer needs; how the host tracks
/// dependencies or re-renders is its own business.
pub trait Host: Clone + Send + Sync + 'static {
    /// Reads a field; missing fields read as null.
    fn read(&self, key: &str) -> Value;

    fn write(&self, key: &str, value: Value);

    /// Replaces a field with `f` of its current value and returns the result.
    ///
    /// Hosts shared across threads should override this so that no other
    /// write lands between the read and the write.
    fn update<F>(&self, key: &str, f: F) -> Value
    where
        F: FnOnce(Value) -> Value,
    {
        let value = f(self.read(key));
        self.write(key, value.clone());
        value
    }

    /// Merges an initial-state record into the host.
    fn merge(&self, fields: Vec<(String, Value)>) {
        for (key, value) in fields {
            self.write(&key, value);
        }
    }

    fn emit(&self, event: &str, payload: Value);

    fn watch(
        &self,
        expr: &Watch<Self>,
        options: WatchOptions,
        callback: WatchCallback<Self>,
    ) -> WatchHandle;

    /// The current value of a watch expression.
    fn evaluate(&self, expr: &Watch<Self>) -> Value {
        match expr {
            Watch::Field(key) => self.read(key),
            Watch::Fields(keys) => Value::Array(keys.iter().map(|key| self.read(key)).collect()),
            Watch::Expr(f) => f(self),
        }
    }
}

/// Truthiness of a watched value, for guards.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
