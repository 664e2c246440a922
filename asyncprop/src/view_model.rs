use crate::{
    Host, MetaNamer, PropStreamExt, ResolutionState, Watch, WatchCallback, WatchHandle,
    WatchOptions,
};
use futures::StreamExt;
use futures_signals::signal::{Mutable, MutableSignalCloned, SignalExt, SignalStream};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 64;

/// The named fields of a view-model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, Value>);

impl Fields {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Fields(iter.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }
}

/// A named event emitted by the view-model, e.g. a property reset.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub payload: Value,
}

/// A reactive object holding named JSON fields.
///
/// Fields live in a `futures_signals` [`Mutable`], so any change can be
/// observed as a signal or stream. Watches are tokio tasks that re-evaluate
/// their expression on every change and call back only when the result
/// differs. Values are compared structurally, so every watch behaves as a
/// deep watch. Cloning is cheap and every clone shares the same fields.
#[derive(Clone)]
pub struct ViewModel {
    fields: Mutable<Fields>,
    events: broadcast::Sender<Event>,
}

impl ViewModel {
    pub fn new() -> Self {
        Self::with_fields(Fields::default())
    }

    pub fn with_fields(fields: Fields) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        ViewModel {
            fields: Mutable::new(fields),
            events,
        }
    }

    pub fn get(&self, key: &str) -> Value {
        self.fields.lock_ref().get(key).cloned().unwrap_or(Value::Null)
    }

    /// Sets a field. Writing an equal value does not notify observers.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let mut fields = self.fields.lock_mut();
        if fields.get(key) != Some(&value) {
            fields.0.insert(key.to_string(), value);
        }
    }

    pub fn snapshot(&self) -> Fields {
        self.fields.get_cloned()
    }

    pub fn to_signal(&self) -> MutableSignalCloned<Fields> {
        self.fields.signal_cloned()
    }

    pub fn to_stream(&self) -> SignalStream<MutableSignalCloned<Fields>> {
        self.fields.signal_cloned().to_stream()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Waits until the property is neither pending nor loading and returns
    /// its state at that point.
    pub async fn settled(&self, name: &str, meta: &MetaNamer) -> ResolutionState {
        let observer = self.clone();
        let name = name.to_string();
        let meta = meta.clone();
        let mut states = Box::pin(
            self.fields
                .signal_ref(|_| ())
                .to_stream()
                .map(move |()| ResolutionState::read(&observer, &name, &meta))
                .stop_if(|state| state.is_idle()),
        );

        let mut last = None;
        while let Some(state) = states.next().await {
            last = Some(state);
        }
        // the signal always yields at least its current value
        last.unwrap_or_else(|| ResolutionState::initial(Value::Null))
    }
}

impl Default for ViewModel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModel")
            .field("fields", &*self.fields.lock_ref())
            .finish()
    }
}

impl Host for ViewModel {
    fn read(&self, key: &str) -> Value {
        self.get(key)
    }

    fn write(&self, key: &str, value: Value) {
        self.set(key, value);
    }

    fn update<F>(&self, key: &str, f: F) -> Value
    where
        F: FnOnce(Value) -> Value,
    {
        let mut fields = self.fields.lock_mut();
        let value = f(fields.get(key).cloned().unwrap_or(Value::Null));
        if fields.get(key) != Some(&value) {
            fields.0.insert(key.to_string(), value.clone());
        }
        value
    }

    fn merge(&self, fields: Vec<(String, Value)>) {
        let mut current = self.fields.lock_mut();
        for (key, value) in fields {
            current.0.insert(key, value);
        }
    }

    fn emit(&self, event: &str, payload: Value) {
        // nobody listening is fine
        let _ = self.events.send(Event {
            name: event.to_string(),
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
        // the baseline is taken now so changes made before the task first runs still count
        let baseline = self.evaluate(expr);
        if options.immediate {
            callback(self);
        }

        let observer = self.clone();
        let expr = expr.clone();
        let mut changes = Box::pin(
            self.fields
                .signal_ref(|_| ())
                .to_stream()
                .map(move |()| observer.evaluate(&expr))
                .changes_from(baseline),
        );

        let view_model = self.clone();
        let guard = token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = guard.cancelled() => break,
                    next = changes.next() => match next {
                        Some(_) => callback(&view_model),
                        None => break,
                    },
                }
            }
        });

        WatchHandle::new(token)
    }
}
