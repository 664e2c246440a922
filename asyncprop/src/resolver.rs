use crate::{
    Concat, ConfigError, ErrorHandler, Fetch, Getter, Outcome, PropertyDescriptor, PropertyError,
    SettleOrder, Transform,
};
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A callback through which the engine writes externally owned state.
pub type Sink<H, T> = Arc<dyn Fn(&H, T) + Send + Sync>;

/// The only way a resolver touches state. Every sink receives the owning host
/// explicitly; how the host stores the value is none of the engine's business.
pub struct Sinks<H> {
    pub assign_value: Sink<H, Value>,
    /// Joins a page onto the current value in a single host update; only
    /// "load more" resolvers call it.
    pub append_value: Arc<dyn Fn(&H, &Concat, Value) + Send + Sync>,
    pub assign_loading: Sink<H, bool>,
    pub assign_pending: Option<Sink<H, bool>>,
    pub assign_error: Sink<H, Option<PropertyError>>,
    pub emit_reset: Option<Sink<H, Value>>,
}

impl<H> Clone for Sinks<H> {
    fn clone(&self) -> Self {
        Sinks {
            assign_value: self.assign_value.clone(),
            append_value: self.append_value.clone(),
            assign_loading: self.assign_loading.clone(),
            assign_pending: self.assign_pending.clone(),
            assign_error: self.assign_error.clone(),
            emit_reset: self.emit_reset.clone(),
        }
    }
}

struct ResolverInner<H> {
    name: String,
    getter: Getter<H>,
    // Some for "load more" resolvers
    concat: Option<Concat>,
    transform: Transform<H>,
    error_handler: ErrorHandler<H>,
    default_value: Value,
    order: SettleOrder,
    sinks: Sinks<H>,
    generation: AtomicU64,
    // deferred invocations that have not settled yet
    in_flight: AtomicU64,
}

/// One resolution pipeline for one property: call the getter, then drive the
/// value, loading and error sinks until the result settles.
///
/// Invocations are not serialized. Several may be in flight at once and, with
/// [`SettleOrder::LastSettled`], whichever settles last decides the final
/// state. Deferred results are settled on a spawned tokio task, so invoking a
/// resolver whose getter returns a future requires a running runtime.
pub struct Resolver<H> {
    inner: Arc<ResolverInner<H>>,
}

impl<H> Clone for Resolver<H> {
    fn clone(&self) -> Self {
        Resolver {
            inner: self.inner.clone(),
        }
    }
}

impl<H> fmt::Debug for Resolver<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("name", &self.inner.name)
            .field("more", &self.inner.concat.is_some())
            .field("order", &self.inner.order)
            .finish()
    }
}

impl<H> Resolver<H>
where
    H: Clone + Send + Sync + 'static,
{
    /// The full refresh resolver: settled values overwrite the current one.
    pub fn build(descriptor: &PropertyDescriptor<H>, sinks: Sinks<H>) -> Self {
        Self::from_parts(descriptor, descriptor.getter.clone(), None, sinks)
    }

    /// The incremental resolver: settled values are joined onto the current
    /// one with the descriptor's concat function.
    pub fn build_more(
        descriptor: &PropertyDescriptor<H>,
        sinks: Sinks<H>,
    ) -> Result<Self, ConfigError> {
        let more = descriptor
            .more
            .as_ref()
            .ok_or_else(|| ConfigError::MissingMore {
                name: descriptor.name.clone(),
            })?;
        Ok(Self::from_parts(
            descriptor,
            more.getter.clone(),
            Some(more.concat.clone()),
            sinks,
        ))
    }

    fn from_parts(
        descriptor: &PropertyDescriptor<H>,
        getter: Getter<H>,
        concat: Option<Concat>,
        sinks: Sinks<H>,
    ) -> Self {
        Resolver {
            inner: Arc::new(ResolverInner {
                name: descriptor.name.clone(),
                getter,
                concat,
                transform: descriptor.transform.clone(),
                error_handler: descriptor.error_handler.clone(),
                default_value: descriptor.default_value.clone(),
                order: descriptor.order,
                sinks,
                generation: AtomicU64::new(0),
                in_flight: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_more(&self) -> bool {
        self.inner.concat.is_some()
    }

    pub fn invoke(&self, host: &H) -> Invocation {
        self.invoke_with(host, &[])
    }

    pub fn invoke_with(&self, host: &H, args: &[Value]) -> Invocation {
        let inner = &self.inner;
        let sinks = &inner.sinks;
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(property = %inner.name, more = self.is_more(), generation, "resolving");

        // pending ends when the resolution actually runs, not when it is scheduled
        if let Some(assign_pending) = &sinks.assign_pending {
            assign_pending(host, false);
        }
        (sinks.assign_error)(host, None);

        match inner.getter.call(host, args) {
            Ok(Fetch::Ready(value)) => {
                inner.assign(host, value.clone());
                Invocation::Ready(value)
            }
            Ok(Fetch::Deferred(future)) => {
                inner.in_flight.fetch_add(1, Ordering::SeqCst);
                (sinks.assign_loading)(host, true);
                let resolver = self.clone();
                let host = host.clone();
                let handle = tokio::spawn(async move {
                    // a panicking future settles like a rejected one
                    let outcome = AssertUnwindSafe(future)
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            Err(PropertyError::rejected(panic_message(panic)))
                        });
                    resolver.settle(&host, generation, outcome)
                });
                Invocation::Deferred(Settlement { handle })
            }
            Err(error) => {
                debug!(property = %inner.name, %error, "getter failed synchronously");
                inner.fail(host, &error);
                Invocation::Failed(error)
            }
        }
    }

    fn settle(&self, host: &H, generation: u64, outcome: Outcome) -> Option<Value> {
        let inner = &self.inner;
        let still_in_flight = inner.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
        if inner.order == SettleOrder::LatestInvocation
            && inner.generation.load(Ordering::SeqCst) != generation
        {
            debug!(property = %inner.name, generation, "dropping superseded settlement");
            // leave loading to a newer invocation that is still in flight
            if still_in_flight == 0 {
                (inner.sinks.assign_loading)(host, false);
            }
            return outcome.ok();
        }

        let settled = match outcome {
            Ok(raw) => {
                let value = inner.transform.apply(host, raw.clone());
                inner.assign(host, value);
                Some(raw)
            }
            Err(error) => {
                inner.fail(host, &error);
                None
            }
        };

        (inner.sinks.assign_loading)(host, false);
        if !self.is_more() {
            if let Some(emit_reset) = &inner.sinks.emit_reset {
                emit_reset(host, settled.clone().unwrap_or(Value::Null));
            }
        }
        debug!(property = %inner.name, generation, ok = settled.is_some(), "settled");
        settled
    }
}

impl<H: 'static> ResolverInner<H> {
    fn defaulted(&self, value: Value) -> Value {
        if value.is_null() {
            self.default_value.clone()
        } else {
            value
        }
    }

    fn assign(&self, host: &H, value: Value) {
        let value = self.defaulted(value);
        match &self.concat {
            Some(concat) => (self.sinks.append_value)(host, concat, value),
            None => (self.sinks.assign_value)(host, value),
        }
    }

    fn fail(&self, host: &H, error: &PropertyError) {
        self.error_handler.handle(host, error);
        (self.sinks.assign_error)(host, Some(error.clone()));
        self.assign(host, Value::Null);
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(message) => *message,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "getter panicked".to_string(),
        },
    }
}

/// What a single resolver invocation produced.
#[derive(Debug)]
pub enum Invocation {
    /// The getter returned a value; it has already been assigned.
    Ready(Value),
    /// The getter returned a future; it settles on a spawned task.
    Deferred(Settlement),
    /// The getter failed synchronously; the error has already been recorded.
    Failed(PropertyError),
}

impl Invocation {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Invocation::Deferred(_))
    }

    /// Waits for the raw result, before transform and defaulting.
    ///
    /// Errors are absorbed by the resolver and show up here as `None`.
    pub async fn settled(self) -> Option<Value> {
        match self {
            Invocation::Ready(value) => Some(value),
            Invocation::Deferred(settlement) => settlement.await,
            Invocation::Failed(_) => None,
        }
    }
}

/// Resolves to the raw result of a deferred invocation once its sinks have run.
#[derive(Debug)]
pub struct Settlement {
    handle: JoinHandle<Option<Value>>,
}

impl Future for Settlement {
    type Output = Option<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|joined| joined.ok().flatten())
    }
}
