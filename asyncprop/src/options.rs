use crate::{
    Concat, ConfigError, DebounceSpec, ErrorHandler, Getter, IntoFetch, MetaNamer, Mode, More,
    PropertyDescriptor, SettleOrder, Transform, Watch,
};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// An option that distinguishes "not given" from an explicit null.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Tristate<T> {
    Absent,
    Null,
    Set(T),
}

impl<T> Tristate<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Tristate::Absent)
    }

    /// Keeps `self` unless it was never given.
    pub fn or(self, fallback: Tristate<T>) -> Tristate<T> {
        match self {
            Tristate::Absent => fallback,
            given => given,
        }
    }
}

impl<T> Default for Tristate<T> {
    fn default() -> Self {
        Tristate::Absent
    }
}

impl<T> From<Option<T>> for Tristate<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Tristate::Set(value),
            None => Tristate::Null,
        }
    }
}

/// The object form of a debounce option. Unset fields are filled from lower
/// precedence layers, then from the built-in default.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct DebounceConfig {
    pub wait: Option<u64>,
    pub leading: Option<bool>,
    pub trailing: Option<bool>,
    pub max_wait: Option<u64>,
}

impl DebounceConfig {
    fn fill_from(self, lower: DebounceConfig) -> DebounceConfig {
        DebounceConfig {
            wait: self.wait.or(lower.wait),
            leading: self.leading.or(lower.leading),
            trailing: self.trailing.or(lower.trailing),
            max_wait: self.max_wait.or(lower.max_wait),
        }
    }

    fn finish(self) -> DebounceSpec {
        let builtin = DebounceSpec::default();
        DebounceSpec {
            wait: self.wait.map(Duration::from_millis).unwrap_or(builtin.wait),
            leading: self.leading.unwrap_or(builtin.leading),
            trailing: self.trailing.unwrap_or(builtin.trailing),
            max_wait: self.max_wait.map(Duration::from_millis).or(builtin.max_wait),
        }
        .normalized()
    }
}

/// User-facing debounce shapes: a bare wait in milliseconds or an object.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum DebounceOption {
    Wait(u64),
    Config(DebounceConfig),
}

impl DebounceOption {
    fn as_config(&self) -> DebounceConfig {
        match *self {
            DebounceOption::Wait(wait) => DebounceConfig {
                wait: Some(wait),
                leading: Some(false),
                trailing: Some(true),
                max_wait: None,
            },
            DebounceOption::Config(config) => config,
        }
    }
}

impl From<u64> for DebounceOption {
    fn from(wait: u64) -> Self {
        DebounceOption::Wait(wait)
    }
}

impl From<DebounceConfig> for DebounceOption {
    fn from(config: DebounceConfig) -> Self {
        DebounceOption::Config(config)
    }
}

/// Folds debounce layers, highest precedence first.
///
/// The first layer that says anything decides whether debouncing is on. Object
/// layers are deep-merged with the object layers below them until an explicit
/// null stops the merge.
pub fn resolve_debounce(layers: &[&Tristate<DebounceOption>]) -> Option<DebounceSpec> {
    let mut merged: Option<DebounceConfig> = None;
    for layer in layers {
        match layer {
            Tristate::Absent => continue,
            Tristate::Null => break,
            Tristate::Set(option) => {
                let config = option.as_config();
                merged = Some(match merged {
                    Some(higher) => higher.fill_from(config),
                    None => config,
                });
            }
        }
    }
    match merged {
        Some(config) => Some(config.finish()),
        None if layers.iter().all(|layer| layer.is_absent()) => Some(DebounceSpec::default()),
        None => None,
    }
}

/// The two shapes `more` may be given in.
pub enum MoreOption<H> {
    Getter(Getter<H>),
    Full {
        get: Getter<H>,
        concat: Option<Concat>,
    },
}

impl<H> MoreOption<H> {
    fn normalize(self) -> More<H> {
        match self {
            MoreOption::Getter(getter) => More {
                getter,
                concat: Concat::default(),
            },
            MoreOption::Full { get, concat } => More {
                getter: get,
                concat: concat.unwrap_or_default(),
            },
        }
    }
}

impl<H> Clone for MoreOption<H> {
    fn clone(&self) -> Self {
        match self {
            MoreOption::Getter(getter) => MoreOption::Getter(getter.clone()),
            MoreOption::Full { get, concat } => MoreOption::Full {
                get: get.clone(),
                concat: concat.clone(),
            },
        }
    }
}

/// Options for one property, as declared by the user.
pub struct PropertyOptions<H> {
    pub get: Option<Getter<H>>,
    pub more: Option<MoreOption<H>>,
    pub transform: Tristate<Transform<H>>,
    pub error: Option<ErrorHandler<H>>,
    pub default: Option<Value>,
    pub debounce: Tristate<DebounceOption>,
    pub lazy: Option<bool>,
    pub eager: Option<bool>,
    pub watch: Option<Watch<H>>,
    pub watch_closely: Option<Watch<H>>,
    pub order: Option<SettleOrder>,
}

impl<H: 'static> PropertyOptions<H> {
    pub fn new() -> Self {
        PropertyOptions {
            get: None,
            more: None,
            transform: Tristate::Absent,
            error: None,
            default: None,
            debounce: Tristate::Absent,
            lazy: None,
            eager: None,
            watch: None,
            watch_closely: None,
            order: None,
        }
    }

    pub fn get<F, R>(mut self, f: F) -> Self
    where
        F: Fn(&H) -> R + Send + Sync + 'static,
        R: IntoFetch,
    {
        self.get = Some(Getter::new(f));
        self
    }

    pub fn get_with_args<F, R>(mut self, f: F) -> Self
    where
        F: Fn(&H, &[Value]) -> R + Send + Sync + 'static,
        R: IntoFetch,
    {
        self.get = Some(Getter::with_args(f));
        self
    }

    pub fn more<F, R>(mut self, f: F) -> Self
    where
        F: Fn(&H) -> R + Send + Sync + 'static,
        R: IntoFetch,
    {
        self.more = Some(MoreOption::Getter(Getter::new(f)));
        self
    }

    pub fn more_with<F, R>(mut self, f: F, concat: Concat) -> Self
    where
        F: Fn(&H) -> R + Send + Sync + 'static,
        R: IntoFetch,
    {
        self.more = Some(MoreOption::Full {
            get: Getter::new(f),
            concat: Some(concat),
        });
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&H, Value) -> Value + Send + Sync + 'static,
    {
        self.transform = Tristate::Set(Transform::new(f));
        self
    }

    /// Explicit null transform: settled values are taken as they are.
    pub fn raw(mut self) -> Self {
        self.transform = Tristate::Null;
        self
    }

    pub fn error<F>(mut self, f: F) -> Self
    where
        F: Fn(&H, &crate::PropertyError) + Send + Sync + 'static,
    {
        self.error = Some(ErrorHandler::new(f));
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn debounce(mut self, option: impl Into<DebounceOption>) -> Self {
        self.debounce = Tristate::Set(option.into());
        self
    }

    pub fn no_debounce(mut self) -> Self {
        self.debounce = Tristate::Null;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = Some(lazy);
        self
    }

    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = Some(eager);
        self
    }

    pub fn watch(mut self, watch: Watch<H>) -> Self {
        self.watch = Some(watch);
        self
    }

    pub fn watch_closely(mut self, watch: Watch<H>) -> Self {
        self.watch_closely = Some(watch);
        self
    }

    pub fn order(mut self, order: SettleOrder) -> Self {
        self.order = Some(order);
        self
    }
}

impl<H: 'static> Default for PropertyOptions<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: 'static> From<Getter<H>> for PropertyOptions<H> {
    fn from(getter: Getter<H>) -> Self {
        PropertyOptions {
            get: Some(getter),
            ..Self::new()
        }
    }
}

impl<H> Clone for PropertyOptions<H> {
    fn clone(&self) -> Self {
        PropertyOptions {
            get: self.get.clone(),
            more: self.more.clone(),
            transform: self.transform.clone(),
            error: self.error.clone(),
            default: self.default.clone(),
            debounce: self.debounce,
            lazy: self.lazy,
            eager: self.eager,
            watch: self.watch.clone(),
            watch_closely: self.watch_closely.clone(),
            order: self.order,
        }
    }
}

impl<H> fmt::Debug for PropertyOptions<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyOptions")
            .field("get", &self.get.is_some())
            .field("more", &self.more.is_some())
            .field("default", &self.default)
            .field("debounce", &self.debounce)
            .field("lazy", &self.lazy)
            .field("eager", &self.eager)
            .field("watch", &self.watch)
            .field("watch_closely", &self.watch_closely)
            .finish()
    }
}

/// Defaults shared by every property bound through one installation.
pub struct GlobalOptions<H> {
    pub meta: MetaNamer,
    pub transform: Tristate<Transform<H>>,
    pub error: Option<ErrorHandler<H>>,
    pub debounce: Tristate<DebounceOption>,
    pub lazy: Option<bool>,
    pub eager: Option<bool>,
    pub order: Option<SettleOrder>,
}

impl<H: 'static> GlobalOptions<H> {
    pub fn new() -> Self {
        GlobalOptions {
            meta: MetaNamer::default(),
            transform: Tristate::Absent,
            error: None,
            debounce: Tristate::Absent,
            lazy: None,
            eager: None,
            order: None,
        }
    }

    pub fn from_config(config: GlobalConfig) -> Self {
        GlobalOptions {
            meta: config
                .separator
                .map(MetaNamer::with_separator)
                .unwrap_or_default(),
            transform: if config.raw {
                Tristate::Null
            } else {
                Tristate::Absent
            },
            error: None,
            debounce: config.debounce,
            lazy: config.lazy,
            eager: config.eager,
            order: config.latest_wins.map(|latest| {
                if latest {
                    SettleOrder::LatestInvocation
                } else {
                    SettleOrder::LastSettled
                }
            }),
        }
    }

    pub fn meta(mut self, meta: MetaNamer) -> Self {
        self.meta = meta;
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&H, Value) -> Value + Send + Sync + 'static,
    {
        self.transform = Tristate::Set(Transform::new(f));
        self
    }

    pub fn raw(mut self) -> Self {
        self.transform = Tristate::Null;
        self
    }

    pub fn error<F>(mut self, f: F) -> Self
    where
        F: Fn(&H, &crate::PropertyError) + Send + Sync + 'static,
    {
        self.error = Some(ErrorHandler::new(f));
        self
    }

    pub fn debounce(mut self, option: impl Into<DebounceOption>) -> Self {
        self.debounce = Tristate::Set(option.into());
        self
    }

    pub fn no_debounce(mut self) -> Self {
        self.debounce = Tristate::Null;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = Some(lazy);
        self
    }

    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = Some(eager);
        self
    }

    pub fn order(mut self, order: SettleOrder) -> Self {
        self.order = Some(order);
        self
    }
}

impl<H: 'static> Default for GlobalOptions<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> Clone for GlobalOptions<H> {
    fn clone(&self) -> Self {
        GlobalOptions {
            meta: self.meta.clone(),
            transform: self.transform.clone(),
            error: self.error.clone(),
            debounce: self.debounce,
            lazy: self.lazy,
            eager: self.eager,
            order: self.order,
        }
    }
}

impl<H> fmt::Debug for GlobalOptions<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalOptions")
            .field("meta", &self.meta)
            .field("debounce", &self.debounce)
            .field("lazy", &self.lazy)
            .field("eager", &self.eager)
            .field("order", &self.order)
            .finish()
    }
}

/// The data-only part of the global defaults, as read from a JSON object.
///
/// Recognized keys: `separator`, `transform` (only `null`), `debounce`,
/// `lazy`, `eager`, `latestWins`. Other keys are ignored.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct GlobalConfig {
    pub separator: Option<String>,
    pub raw: bool,
    pub debounce: Tristate<DebounceOption>,
    pub lazy: Option<bool>,
    pub eager: Option<bool>,
    pub latest_wins: Option<bool>,
}

impl GlobalConfig {
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let object = value.as_object().ok_or_else(|| ConfigError::InvalidConfig {
            key: "<root>".to_string(),
            reason: "expected an object".to_string(),
        })?;

        let mut config = GlobalConfig::default();
        for (key, value) in object {
            match key.as_str() {
                "separator" => config.separator = Some(expect_str(key, value)?.to_string()),
                "transform" => {
                    if !value.is_null() {
                        return Err(invalid(key, "only null is accepted"));
                    }
                    config.raw = true;
                }
                "debounce" => config.debounce = parse_debounce(value)?,
                "lazy" => config.lazy = Some(expect_bool(key, value)?),
                "eager" => config.eager = Some(expect_bool(key, value)?),
                "latestWins" => config.latest_wins = Some(expect_bool(key, value)?),
                _ => {}
            }
        }
        Ok(config)
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidConfig {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn expect_bool(key: &str, value: &Value) -> Result<bool, ConfigError> {
    value.as_bool().ok_or_else(|| invalid(key, "expected a boolean"))
}

fn expect_str<'a>(key: &str, value: &'a Value) -> Result<&'a str, ConfigError> {
    value.as_str().ok_or_else(|| invalid(key, "expected a string"))
}

fn expect_millis(key: &str, value: &Value) -> Result<Option<u64>, ConfigError> {
    match value {
        Value::Null => Ok(None),
        value => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(key, "expected milliseconds")),
    }
}

fn parse_debounce(value: &Value) -> Result<Tristate<DebounceOption>, ConfigError> {
    match value {
        Value::Null => Ok(Tristate::Null),
        Value::Number(_) => {
            let wait = value
                .as_u64()
                .ok_or_else(|| invalid("debounce", "expected milliseconds"))?;
            Ok(Tristate::Set(DebounceOption::Wait(wait)))
        }
        Value::Object(object) => {
            let mut config = DebounceConfig::default();
            // anything outside the four known keys is dropped
            for (key, value) in object {
                match key.as_str() {
                    "wait" => config.wait = expect_millis(key, value)?,
                    "leading" => config.leading = Some(expect_bool(key, value)?),
                    "trailing" => config.trailing = Some(expect_bool(key, value)?),
                    "maxWait" => config.max_wait = expect_millis(key, value)?,
                    _ => {}
                }
            }
            Ok(Tristate::Set(DebounceOption::Config(config)))
        }
        _ => Err(invalid("debounce", "expected a number, an object or null")),
    }
}

/// Normalizes user options into a descriptor for `mode`.
///
/// Precedence, highest first: the property's own options, the global options,
/// the mode built-ins, the common built-ins. The inputs are only borrowed and
/// every piece of them that ends up in the descriptor is cloned.
pub fn resolve<H: 'static>(
    name: &str,
    mode: Mode,
    options: &PropertyOptions<H>,
    global: &GlobalOptions<H>,
) -> Result<PropertyDescriptor<H>, ConfigError> {
    let options = options.clone();

    let getter = options.get.ok_or_else(|| ConfigError::MissingGetter {
        name: name.to_string(),
        mode,
    })?;

    let transform = match options.transform.or(global.transform.clone()) {
        Tristate::Set(transform) => transform,
        Tristate::Null => Transform::identity(),
        Tristate::Absent => Transform::extract_data(),
    };

    let error_handler = options
        .error
        .or_else(|| global.error.clone())
        .unwrap_or_else(ErrorHandler::log);

    let debounce = match mode {
        Mode::Computed => resolve_debounce(&[&options.debounce, &global.debounce]),
        Mode::Data | Mode::Method => None,
    };

    let (watch, watch_closely) = match mode {
        Mode::Computed => (options.watch, options.watch_closely),
        Mode::Data | Mode::Method => (None, None),
    };

    let more = match mode {
        Mode::Data | Mode::Computed => options.more.map(MoreOption::normalize),
        Mode::Method => None,
    };

    Ok(PropertyDescriptor {
        name: name.to_string(),
        mode,
        getter,
        more,
        transform,
        error_handler,
        default_value: options.default.unwrap_or(Value::Null),
        debounce,
        lazy: mode == Mode::Data && options.lazy.or(global.lazy).unwrap_or(false),
        eager: mode == Mode::Computed && options.eager.or(global.eager).unwrap_or(false),
        watch,
        watch_closely,
        // method results go back to the caller, so stale settlements are never dropped
        order: match mode {
            Mode::Method => SettleOrder::LastSettled,
            Mode::Data | Mode::Computed => options.order.or(global.order).unwrap_or_default(),
        },
    })
}

/// Bind-time check: a computed property needs something to watch.
pub fn validate_watch<H>(descriptor: &PropertyDescriptor<H>) -> Result<(), ConfigError> {
    if descriptor.mode == Mode::Computed
        && descriptor.watch.is_none()
        && descriptor.watch_closely.is_none()
    {
        return Err(ConfigError::MissingWatch {
            name: descriptor.name.clone(),
        });
    }
    Ok(())
}
