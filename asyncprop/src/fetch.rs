use crate::PropertyError;
use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// What a settled future hands back to the resolver.
pub type Outcome = Result<Value, PropertyError>;

/// The result of calling a getter: either a value available right away or
/// a future that will settle later.
///
/// Only `Deferred` results ever raise the loading flag.
pub enum Fetch {
    Ready(Value),
    Deferred(BoxFuture<'static, Outcome>),
}

impl Fetch {
    pub fn ready(value: impl Into<Value>) -> Self {
        Fetch::Ready(value.into())
    }

    pub fn deferred<F, R>(future: F) -> Self
    where
        F: Future<Output = R> + Send + 'static,
        R: IntoOutcome,
    {
        Fetch::Deferred(Box::pin(async move { future.await.into_outcome() }))
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Fetch::Deferred(_))
    }
}

impl fmt::Debug for Fetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fetch::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Fetch::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Conversion from the output of a getter's future into an [`Outcome`].
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for Value {
    fn into_outcome(self) -> Outcome {
        Ok(self)
    }
}

impl IntoOutcome for Option<Value> {
    fn into_outcome(self) -> Outcome {
        Ok(self.unwrap_or(Value::Null))
    }
}

impl<E> IntoOutcome for Result<Value, E>
where
    E: ToString,
{
    fn into_outcome(self) -> Outcome {
        self.map_err(|error| PropertyError::Rejected(error.to_string()))
    }
}

/// Conversion from whatever a getter returns into a [`Fetch`].
///
/// An `Err` here is a synchronous failure: the getter could not even start.
pub trait IntoFetch {
    fn into_fetch(self) -> Result<Fetch, PropertyError>;
}

impl IntoFetch for Fetch {
    fn into_fetch(self) -> Result<Fetch, PropertyError> {
        Ok(self)
    }
}

impl IntoFetch for Value {
    fn into_fetch(self) -> Result<Fetch, PropertyError> {
        Ok(Fetch::Ready(self))
    }
}

impl IntoFetch for Option<Value> {
    fn into_fetch(self) -> Result<Fetch, PropertyError> {
        Ok(Fetch::Ready(self.unwrap_or(Value::Null)))
    }
}

impl<E> IntoFetch for Result<Fetch, E>
where
    E: ToString,
{
    fn into_fetch(self) -> Result<Fetch, PropertyError> {
        self.map_err(|error| PropertyError::Thrown(error.to_string()))
    }
}

impl<E> IntoFetch for Result<Value, E>
where
    E: ToString,
{
    fn into_fetch(self) -> Result<Fetch, PropertyError> {
        self.map(Fetch::Ready)
            .map_err(|error| PropertyError::Thrown(error.to_string()))
    }
}

/// The user supplied function producing a property's value.
///
/// The host is passed explicitly; method properties also receive the call
/// arguments, every other mode gets an empty slice.
pub struct Getter<H> {
    f: Arc<dyn Fn(&H, &[Value]) -> Result<Fetch, PropertyError> + Send + Sync>,
}

impl<H: 'static> Getter<H> {
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn(&H) -> R + Send + Sync + 'static,
        R: IntoFetch,
    {
        Getter {
            f: Arc::new(move |host: &H, _: &[Value]| f(host).into_fetch()),
        }
    }

    pub fn with_args<F, R>(f: F) -> Self
    where
        F: Fn(&H, &[Value]) -> R + Send + Sync + 'static,
        R: IntoFetch,
    {
        Getter {
            f: Arc::new(move |host: &H, args: &[Value]| f(host, args).into_fetch()),
        }
    }

    pub fn call(&self, host: &H, args: &[Value]) -> Result<Fetch, PropertyError> {
        (self.f)(host, args)
    }
}

impl<H> Clone for Getter<H> {
    fn clone(&self) -> Self {
        Getter { f: self.f.clone() }
    }
}

impl<H> fmt::Debug for Getter<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Getter(..)")
    }
}

/// Post-processing applied to values produced by a settled future.
pub struct Transform<H> {
    f: Arc<dyn Fn(&H, Value) -> Value + Send + Sync>,
}

impl<H: 'static> Transform<H> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&H, Value) -> Value + Send + Sync + 'static,
    {
        Transform { f: Arc::new(f) }
    }

    /// Picks the `data` field out of an object; anything else becomes null.
    pub fn extract_data() -> Self {
        Self::new(|_, raw| match raw {
            Value::Object(mut map) => map.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        })
    }

    pub fn identity() -> Self {
        Self::new(|_, raw| raw)
    }

    pub fn apply(&self, host: &H, raw: Value) -> Value {
        (self.f)(host, raw)
    }
}

impl<H> Clone for Transform<H> {
    fn clone(&self) -> Self {
        Transform { f: self.f.clone() }
    }
}

impl<H> fmt::Debug for Transform<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transform(..)")
    }
}

/// Receives every resolution error before it is recorded.
pub struct ErrorHandler<H> {
    f: Arc<dyn Fn(&H, &PropertyError) + Send + Sync>,
}

impl<H: 'static> ErrorHandler<H> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&H, &PropertyError) + Send + Sync + 'static,
    {
        ErrorHandler { f: Arc::new(f) }
    }

    pub fn log() -> Self {
        Self::new(|_, error| tracing::error!(%error, "async property resolution failed"))
    }

    pub fn handle(&self, host: &H, error: &PropertyError) {
        (self.f)(host, error)
    }
}

impl<H> Clone for ErrorHandler<H> {
    fn clone(&self) -> Self {
        ErrorHandler { f: self.f.clone() }
    }
}

impl<H> fmt::Debug for ErrorHandler<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ErrorHandler(..)")
    }
}

/// Joins the current collection with an incoming page.
#[derive(Clone)]
pub struct Concat {
    f: Arc<dyn Fn(Value, Value) -> Value + Send + Sync>,
}

impl Concat {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Value, Value) -> Value + Send + Sync + 'static,
    {
        Concat { f: Arc::new(f) }
    }

    /// Array append. A null page leaves the collection alone, a null
    /// collection is replaced by the page, and scalars are wrapped.
    pub fn append() -> Self {
        Self::new(|existing, incoming| match (existing, incoming) {
            (existing, Value::Null) => existing,
            (Value::Null, incoming) => incoming,
            (Value::Array(mut items), Value::Array(more)) => {
                items.extend(more);
                Value::Array(items)
            }
            (Value::Array(mut items), incoming) => {
                items.push(incoming);
                Value::Array(items)
            }
            (existing, Value::Array(more)) => {
                let mut items = vec![existing];
                items.extend(more);
                Value::Array(items)
            }
            (existing, incoming) => Value::Array(vec![existing, incoming]),
        })
    }

    pub fn apply(&self, existing: Value, incoming: Value) -> Value {
        (self.f)(existing, incoming)
    }
}

impl Default for Concat {
    fn default() -> Self {
        Self::append()
    }
}

impl fmt::Debug for Concat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Concat(..)")
    }
}
