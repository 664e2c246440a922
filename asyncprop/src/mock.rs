use crate::{Host, Watch, WatchCallback, WatchHandle, WatchOptions};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// One interaction with a [`RecordingHost`], in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOperation {
    Write { key: String, value: Value },
    Emit { event: String, payload: Value },
    Watch { immediate: bool },
}

struct Watcher {
    expr: Watch<RecordingHost>,
    last: Value,
    callback: WatchCallback<RecordingHost>,
    token: CancellationToken,
}

#[derive(Default)]
struct Recorded {
    fields: BTreeMap<String, Value>,
    operations: Vec<HostOperation>,
    watchers: Vec<Watcher>,
}

/// A host that records every operation and runs watchers synchronously.
///
/// Writing a field re-evaluates every live watch right away, before `write`
/// returns, which makes sink ordering and watch behavior easy to assert on
/// without waiting for tasks.
#[derive(Clone, Default)]
pub struct RecordingHost {
    recorded: Arc<Mutex<Recorded>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sets a field as user code would, triggering watchers.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.write(key, value.into());
    }

    pub fn get(&self, key: &str) -> Value {
        self.read(key)
    }

    pub fn operations(&self) -> Vec<HostOperation> {
        self.lock().operations.clone()
    }

    /// Every value written to `key`, oldest first.
    pub fn writes_to(&self, key: &str) -> Vec<Value> {
        self.lock()
            .operations
            .iter()
            .filter_map(|operation| match operation {
                HostOperation::Write { key: written, value } if written == key => {
                    Some(value.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.lock()
            .operations
            .iter()
            .filter_map(|operation| match operation {
                HostOperation::Emit { event, payload } => Some((event.clone(), payload.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    pub fn active_watchers(&self) -> usize {
        self.lock()
            .watchers
            .iter()
            .filter(|watcher| !watcher.token.is_cancelled())
            .count()
    }

    fn run_watchers(&self) {
        // expressions may read the host, so evaluate without holding the lock
        let watchers: Vec<(usize, Watch<RecordingHost>, Value)> = {
            self.lock()
                .watchers
                .iter()
                .enumerate()
                .filter(|(_, watcher)| !watcher.token.is_cancelled())
                .map(|(index, watcher)| (index, watcher.expr.clone(), watcher.last.clone()))
                .collect()
        };

        let mut due = Vec::new();
        for (index, expr, last) in watchers {
            let current = self.evaluate(&expr);
            if current != last {
                let mut recorded = self.lock();
                if let Some(watcher) = recorded.watchers.get_mut(index) {
                    watcher.last = current;
                    due.push(watcher.callback.clone());
                }
            }
        }
        for callback in due {
            callback(self);
        }
    }
}

impl Host for RecordingHost {
    fn read(&self, key: &str) -> Value {
        self.lock().fields.get(key).cloned().unwrap_or(Value::Null)
    }

    fn write(&self, key: &str, value: Value) {
        self.update(key, |_| value);
    }

    fn update<F>(&self, key: &str, f: F) -> Value
    where
        F: FnOnce(Value) -> Value,
    {
        let value = {
            let mut recorded = self.lock();
            let value = f(recorded.fields.get(key).cloned().unwrap_or(Value::Null));
            recorded.operations.push(HostOperation::Write {
                key: key.to_string(),
                value: value.clone(),
            });
            recorded.fields.insert(key.to_string(), value.clone());
            value
        };
        self.run_watchers();
        value
    }

    fn emit(&self, event: &str, payload: Value) {
        self.lock().operations.push(HostOperation::Emit {
            event: event.to_string(),
            payload,
        });
    }

    fn watch(
        &self,
        expr: &Watch<Self>,
        options: WatchOptions,
        callback: WatchCallback<Self>,
    ) -> WatchHandle {
        let token = CancellationToken::new();
        let last = self.evaluate(expr);
        {
            let mut recorded = self.lock();
            recorded.operations.push(HostOperation::Watch {
                immediate: options.immediate,
            });
            recorded.watchers.push(Watcher {
                expr: expr.clone(),
                last,
                callback: callback.clone(),
                token: token.clone(),
            });
        }
        if options.immediate {
            callback(self);
        }
        WatchHandle::new(token)
    }
}
