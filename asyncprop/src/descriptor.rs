use crate::{Concat, ErrorHandler, Getter, Transform};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Which lifecycle a property follows.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mode {
    /// Resolved at startup (unless lazy) and on explicit refresh.
    Data,
    /// Re-resolved when watched dependencies change, debounced by default.
    Computed,
    /// Resolved only when called, with arguments.
    Method,
}

/// Normalized debounce settings for a computed property.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DebounceSpec {
    pub wait: Duration,
    pub leading: bool,
    pub trailing: bool,
    pub max_wait: Option<Duration>,
}

impl DebounceSpec {
    pub const DEFAULT_WAIT: Duration = Duration::from_millis(1000);

    pub fn trailing(wait: Duration) -> Self {
        DebounceSpec {
            wait,
            leading: false,
            trailing: true,
            max_wait: None,
        }
    }

    /// Raises `max_wait` to at least `wait`; a shorter cap would fire on
    /// every tick of a burst.
    pub fn normalized(self) -> Self {
        DebounceSpec {
            max_wait: self.max_wait.map(|max_wait| max_wait.max(self.wait)),
            ..self
        }
    }
}

impl Default for DebounceSpec {
    fn default() -> Self {
        Self::trailing(Self::DEFAULT_WAIT)
    }
}

/// A dependency expression the host watches on behalf of a property.
pub enum Watch<H> {
    /// A single field of the host.
    Field(String),
    /// Several fields; a change to any of them triggers.
    Fields(Vec<String>),
    /// An arbitrary expression over the host.
    Expr(Arc<dyn Fn(&H) -> Value + Send + Sync>),
}

impl<H> Watch<H> {
    pub fn field(name: impl Into<String>) -> Self {
        Watch::Field(name.into())
    }

    pub fn fields<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Watch::Fields(names.into_iter().map(Into::into).collect())
    }

    pub fn expr<F>(f: F) -> Self
    where
        F: Fn(&H) -> Value + Send + Sync + 'static,
    {
        Watch::Expr(Arc::new(f))
    }
}

impl<H> Clone for Watch<H> {
    fn clone(&self) -> Self {
        match self {
            Watch::Field(name) => Watch::Field(name.clone()),
            Watch::Fields(names) => Watch::Fields(names.clone()),
            Watch::Expr(f) => Watch::Expr(f.clone()),
        }
    }
}

impl<H> fmt::Debug for Watch<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Watch::Field(name) => f.debug_tuple("Field").field(name).finish(),
            Watch::Fields(names) => f.debug_tuple("Fields").field(names).finish(),
            Watch::Expr(_) => f.write_str("Expr(..)"),
        }
    }
}

/// How overlapping resolutions of one property are reconciled.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SettleOrder {
    /// Every settlement is applied; whichever settles last wins.
    #[default]
    LastSettled,
    /// Settlements of invocations superseded by a newer one are dropped.
    LatestInvocation,
}

/// Incremental "load more" configuration.
pub struct More<H> {
    pub getter: Getter<H>,
    pub concat: Concat,
}

impl<H> Clone for More<H> {
    fn clone(&self) -> Self {
        More {
            getter: self.getter.clone(),
            concat: self.concat.clone(),
        }
    }
}

impl<H> fmt::Debug for More<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("More")
            .field("getter", &self.getter)
            .field("concat", &self.concat)
            .finish()
    }
}

/// A fully normalized async property, ready to be turned into resolvers.
pub struct PropertyDescriptor<H> {
    pub name: String,
    pub mode: Mode,
    pub getter: Getter<H>,
    pub more: Option<More<H>>,
    pub transform: Transform<H>,
    pub error_handler: ErrorHandler<H>,
    pub default_value: Value,
    pub debounce: Option<DebounceSpec>,
    pub lazy: bool,
    pub eager: bool,
    pub watch: Option<Watch<H>>,
    pub watch_closely: Option<Watch<H>>,
    pub order: SettleOrder,
}

impl<H> PropertyDescriptor<H> {
    pub fn has_more(&self) -> bool {
        self.more.is_some()
    }

    /// The debounced path only exists when there is both a debounce window and
    /// a plain `watch` to feed it; `watch_closely` alone never debounces.
    pub fn should_debounce(&self) -> bool {
        self.debounce.is_some() && self.watch.is_some()
    }
}

impl<H> Clone for PropertyDescriptor<H> {
    fn clone(&self) -> Self {
        PropertyDescriptor {
            name: self.name.clone(),
            mode: self.mode,
            getter: self.getter.clone(),
            more: self.more.clone(),
            transform: self.transform.clone(),
            error_handler: self.error_handler.clone(),
            default_value: self.default_value.clone(),
            debounce: self.debounce,
            lazy: self.lazy,
            eager: self.eager,
            watch: self.watch.clone(),
            watch_closely: self.watch_closely.clone(),
            order: self.order,
        }
    }
}

impl<H> fmt::Debug for PropertyDescriptor<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("more", &self.more.is_some())
            .field("default_value", &self.default_value)
            .field("debounce", &self.debounce)
            .field("lazy", &self.lazy)
            .field("eager", &self.eager)
            .field("watch", &self.watch)
            .field("watch_closely", &self.watch_closely)
            .field("order", &self.order)
            .finish()
    }
}
