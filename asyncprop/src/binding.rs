use crate::{
    initial_state, is_truthy, resolve, validate_watch, Concat, ConfigError, Debouncer, GlobalOptions, Host,
    Invocation, MetaNamer, MetaRole, Mode, PropertyDescriptor, PropertyError, PropertyOptions,
    ResolutionState, Resolver, Sink, Sinks, Watch, WatchCallback, WatchHandle, WatchOptions,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

type StartupTask<H> = Arc<dyn Fn(&H) + Send + Sync>;

/// A callable attached to the host under a derived name.
pub enum Action<H> {
    Refresh(Resolver<H>),
    More(Resolver<H>),
    Cancel {
        debouncer: Debouncer<H>,
        pending_key: String,
    },
    Now {
        debouncer: Debouncer<H>,
        pending_key: String,
    },
    Method(Resolver<H>),
}

impl<H> fmt::Debug for Action<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Refresh(resolver) => f.debug_tuple("Refresh").field(resolver).finish(),
            Action::More(resolver) => f.debug_tuple("More").field(resolver).finish(),
            Action::Cancel { pending_key, .. } => f.debug_tuple("Cancel").field(pending_key).finish(),
            Action::Now { pending_key, .. } => f.debug_tuple("Now").field(pending_key).finish(),
            Action::Method(resolver) => f.debug_tuple("Method").field(resolver).finish(),
        }
    }
}

/// Declares the async properties of one owner and binds them to a host.
///
/// ```
/// use asyncprop::{AsyncProperties, Fetch, GlobalOptions, PropertyOptions, ViewModel, Watch};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), asyncprop::ConfigError> {
/// let view_model = ViewModel::new();
/// view_model.set("query", "rust");
///
/// let bound = AsyncProperties::new(GlobalOptions::new().raw().debounce(300u64))
///     .data("profile", PropertyOptions::new().get(|_: &ViewModel| json!({ "name": "ferris" })))
///     .computed(
///         "results",
///         PropertyOptions::new()
///             .watch(Watch::field("query"))
///             .get(|vm: &ViewModel| {
///                 let query = vm.get("query");
///                 Fetch::deferred(async move { json!([query]) })
///             }),
///     )
///     .bind(&view_model)?;
///
/// assert_eq!(view_model.get("profile"), json!({ "name": "ferris" }));
/// bound.now("results")?;
/// # Ok(())
/// # }
/// ```
pub struct AsyncProperties<H> {
    global: GlobalOptions<H>,
    declarations: Vec<(String, Mode, PropertyOptions<H>)>,
    guard: Option<Watch<H>>,
}

impl<H: Host> AsyncProperties<H> {
    pub fn new(global: GlobalOptions<H>) -> Self {
        AsyncProperties {
            global,
            declarations: Vec::new(),
            guard: None,
        }
    }

    pub fn data(self, name: impl Into<String>, options: impl Into<PropertyOptions<H>>) -> Self {
        self.declare(name.into(), Mode::Data, options.into())
    }

    pub fn computed(self, name: impl Into<String>, options: impl Into<PropertyOptions<H>>) -> Self {
        self.declare(name.into(), Mode::Computed, options.into())
    }

    pub fn method(self, name: impl Into<String>, options: impl Into<PropertyOptions<H>>) -> Self {
        self.declare(name.into(), Mode::Method, options.into())
    }

    /// Holds back the startup resolutions (non-lazy data, eager computed)
    /// until `guard` first evaluates truthy.
    pub fn startup_guard(mut self, guard: Watch<H>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn meta(&self) -> &MetaNamer {
        &self.global.meta
    }

    fn declare(mut self, name: String, mode: Mode, options: PropertyOptions<H>) -> Self {
        self.declarations.push((name, mode, options));
        self
    }

    /// Normalizes every declaration, merges the initial state into `host`,
    /// registers the watches and runs the startup resolutions.
    pub fn bind(self, host: &H) -> Result<Bound<H>, ConfigError> {
        let meta = self.global.meta.clone();

        let mut seen = HashSet::new();
        let mut descriptors = Vec::with_capacity(self.declarations.len());
        for (name, mode, options) in &self.declarations {
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateProperty { name: name.clone() });
            }
            let descriptor = resolve(name, *mode, options, &self.global)?;
            validate_watch(&descriptor)?;
            descriptors.push(descriptor);
        }

        for descriptor in &descriptors {
            host.merge(initial_state(descriptor, &meta));
        }

        let mut bound = Bound {
            host: host.clone(),
            meta,
            actions: HashMap::new(),
            descriptors: Vec::with_capacity(descriptors.len()),
            watches: Vec::new(),
            debouncers: Vec::new(),
        };
        let mut startup: Vec<StartupTask<H>> = Vec::new();

        for descriptor in descriptors {
            debug!(property = %descriptor.name, mode = ?descriptor.mode, "binding async property");
            match descriptor.mode {
                Mode::Data => bound.bind_data(&descriptor, &mut startup)?,
                Mode::Computed => bound.bind_computed(&descriptor, &mut startup)?,
                Mode::Method => bound.bind_method(&descriptor),
            }
            bound.descriptors.push(descriptor);
        }

        match self.guard {
            None => {
                for task in &startup {
                    task(host);
                }
            }
            Some(guard) => {
                let has_run = AtomicBool::new(false);
                let condition = guard.clone();
                let callback: WatchCallback<H> = Arc::new(move |host: &H| {
                    if is_truthy(&host.evaluate(&condition)) && !has_run.swap(true, Ordering::SeqCst) {
                        info!(tasks = startup.len(), "startup guard passed");
                        for task in &startup {
                            task(host);
                        }
                    }
                });
                let handle = host.watch(&guard, WatchOptions::deep().immediate(true), callback);
                bound.watches.push(handle);
            }
        }

        Ok(bound)
    }
}

impl<H> fmt::Debug for AsyncProperties<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncProperties")
            .field("global", &self.global)
            .field(
                "declarations",
                &self
                    .declarations
                    .iter()
                    .map(|(name, mode, _)| (name.as_str(), *mode))
                    .collect::<Vec<_>>(),
            )
            .field("guard", &self.guard)
            .finish()
    }
}

fn value_sinks<H: Host>(descriptor: &PropertyDescriptor<H>, meta: &MetaNamer) -> Sinks<H> {
    let name = descriptor.name.clone();
    let value_key = name.clone();
    let append_key = name.clone();
    let loading_key = meta.derive(&name, MetaRole::Loading);

    let assign_pending: Option<Sink<H, bool>> = match descriptor.mode {
        Mode::Computed => {
            let pending_key = meta.derive(&name, MetaRole::Pending);
            Some(Arc::new(move |host: &H, pending: bool| {
                host.write(&pending_key, Value::Bool(pending))
            }))
        }
        Mode::Data | Mode::Method => None,
    };

    // only paginated properties announce resets
    let emit_reset: Option<Sink<H, Value>> = if descriptor.has_more() {
        let reset_event = meta.derive(&name, MetaRole::Reset);
        Some(Arc::new(move |host: &H, settled: Value| {
            host.emit(&reset_event, settled)
        }))
    } else {
        None
    };

    Sinks {
        assign_value: Arc::new(move |host: &H, value: Value| host.write(&value_key, value)),
        append_value: Arc::new(move |host: &H, concat: &Concat, page: Value| {
            host.update(&append_key, |current| concat.apply(current, page));
        }),
        assign_loading: Arc::new(move |host: &H, loading: bool| {
            host.write(&loading_key, Value::Bool(loading))
        }),
        assign_pending,
        assign_error: error_sink(meta.derive(&name, MetaRole::Error)),
        emit_reset,
    }
}

fn method_sinks<H: Host>(descriptor: &PropertyDescriptor<H>, meta: &MetaNamer) -> Sinks<H> {
    let name = descriptor.name.as_str();
    let invocations_key = meta.derive(name, MetaRole::Invocations);
    let loading_key = meta.derive(name, MetaRole::Loading);

    Sinks {
        // the caller gets the value from the invocation, nothing is stored
        assign_value: Arc::new(|_: &H, _: Value| {}),
        append_value: Arc::new(|_: &H, _: &Concat, _: Value| {}),
        assign_loading: Arc::new(move |host: &H, loading: bool| {
            host.update(&invocations_key, |outstanding| {
                let outstanding = outstanding.as_u64().unwrap_or(0);
                Value::from(if loading {
                    outstanding + 1
                } else {
                    outstanding.saturating_sub(1)
                })
            });
            // another invocation may move the counter between the two writes;
            // whoever writes loading last sees the final count
            loop {
                let busy = host.read(&invocations_key).as_u64().unwrap_or(0) > 0;
                host.write(&loading_key, Value::Bool(busy));
                if (host.read(&invocations_key).as_u64().unwrap_or(0) > 0) == busy {
                    break;
                }
            }
        }),
        assign_pending: None,
        assign_error: error_sink(meta.derive(name, MetaRole::Error)),
        emit_reset: None,
    }
}

fn error_sink<H: Host>(error_key: String) -> Sink<H, Option<PropertyError>> {
    Arc::new(move |host: &H, error: Option<PropertyError>| {
        let value = match error {
            Some(error) => Value::String(error.to_string()),
            None => Value::Null,
        };
        host.write(&error_key, value)
    })
}

/// The properties of one owner, bound to its host.
///
/// Holds the named actions and keeps the watches alive. Dropping it
/// unsubscribes every watch and cancels every armed debounce timer;
/// resolutions already in flight still settle.
pub struct Bound<H: Host> {
    host: H,
    meta: MetaNamer,
    actions: HashMap<String, Action<H>>,
    descriptors: Vec<PropertyDescriptor<H>>,
    watches: Vec<WatchHandle>,
    debouncers: Vec<Debouncer<H>>,
}

impl<H: Host> Bound<H> {
    fn bind_data(
        &mut self,
        descriptor: &PropertyDescriptor<H>,
        startup: &mut Vec<StartupTask<H>>,
    ) -> Result<(), ConfigError> {
        let name = descriptor.name.as_str();
        let sinks = value_sinks(descriptor, &self.meta);
        let resolver = Resolver::build(descriptor, sinks.clone());

        if descriptor.has_more() {
            let more = Resolver::build_more(descriptor, sinks)?;
            self.register(name, MetaRole::More, Action::More(more));
        }
        if !descriptor.lazy {
            let resolver = resolver.clone();
            startup.push(Arc::new(move |host: &H| {
                resolver.invoke(host);
            }));
        }
        self.register(name, MetaRole::Refresh, Action::Refresh(resolver));
        Ok(())
    }

    fn bind_computed(
        &mut self,
        descriptor: &PropertyDescriptor<H>,
        startup: &mut Vec<StartupTask<H>>,
    ) -> Result<(), ConfigError> {
        let name = descriptor.name.as_str();
        let pending_key = self.meta.derive(name, MetaRole::Pending);
        let sinks = value_sinks(descriptor, &self.meta);
        let resolver = Resolver::build(descriptor, sinks.clone());

        let debouncer = descriptor.debounce.map(|spec| {
            let resolver = resolver.clone();
            Debouncer::new(spec, move |host: H| {
                resolver.invoke(&host);
            })
        });
        if let Some(debouncer) = &debouncer {
            self.debouncers.push(debouncer.clone());
        }

        let should_debounce = descriptor.should_debounce();
        let default_watch = descriptor
            .watch
            .as_ref()
            .or(descriptor.watch_closely.as_ref())
            .ok_or_else(|| ConfigError::MissingWatch {
                name: name.to_string(),
            })?;

        let on_change: WatchCallback<H> = {
            let resolver = resolver.clone();
            let debouncer = debouncer.clone();
            let pending_key = pending_key.clone();
            Arc::new(move |host: &H| match &debouncer {
                Some(debouncer) if should_debounce => {
                    host.write(&pending_key, Value::Bool(true));
                    debouncer.call(host.clone());
                }
                _ => {
                    resolver.invoke(host);
                }
            })
        };
        let handle = self.host.watch(default_watch, WatchOptions::deep(), on_change);
        self.watches.push(handle);

        // without a debounced path watch_closely was already the default watch
        if let (true, Some(closely), Some(debouncer)) =
            (should_debounce, &descriptor.watch_closely, &debouncer)
        {
            let resolver = resolver.clone();
            let debouncer = debouncer.clone();
            let pending_key = pending_key.clone();
            let on_close_change: WatchCallback<H> = Arc::new(move |host: &H| {
                host.write(&pending_key, Value::Bool(false));
                debouncer.cancel();
                resolver.invoke(host);
            });
            let handle = self.host.watch(closely, WatchOptions::deep(), on_close_change);
            self.watches.push(handle);
        }

        if descriptor.eager {
            let resolver = resolver.clone();
            let debouncer = debouncer.clone();
            startup.push(Arc::new(move |host: &H| {
                resolver.invoke(host);
                if let Some(debouncer) = &debouncer {
                    debouncer.flush();
                }
            }));
        }

        if descriptor.has_more() {
            let more = Resolver::build_more(descriptor, sinks)?;
            self.register(name, MetaRole::More, Action::More(more));
        }
        // cancel and now only exist while there is a debounce to control
        if let Some(debouncer) = debouncer {
            self.register(
                name,
                MetaRole::Cancel,
                Action::Cancel {
                    debouncer: debouncer.clone(),
                    pending_key: pending_key.clone(),
                },
            );
            self.register(
                name,
                MetaRole::Now,
                Action::Now {
                    debouncer,
                    pending_key,
                },
            );
        }
        self.register(name, MetaRole::Refresh, Action::Refresh(resolver));
        Ok(())
    }

    fn bind_method(&mut self, descriptor: &PropertyDescriptor<H>) {
        let sinks = method_sinks(descriptor, &self.meta);
        let resolver = Resolver::build(descriptor, sinks);
        self.actions
            .insert(descriptor.name.clone(), Action::Method(resolver));
    }

    fn register(&mut self, name: &str, role: MetaRole, action: Action<H>) {
        self.actions.insert(self.meta.derive(name, role), action);
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn meta(&self) -> &MetaNamer {
        &self.meta
    }

    pub fn descriptor(&self, name: &str) -> Option<&PropertyDescriptor<H>> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.name == name)
    }

    /// The names under which actions are exposed, sorted.
    pub fn action_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn action(&self, name: &str) -> Option<&Action<H>> {
        self.actions.get(name)
    }

    /// Runs the action registered under `name`.
    ///
    /// Resolving actions return their [`Invocation`]; cancel and now return
    /// `None`.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Option<Invocation>, ConfigError> {
        let action = self.actions.get(name).ok_or_else(|| ConfigError::UnknownAction {
            name: name.to_string(),
        })?;
        let host = &self.host;
        Ok(match action {
            Action::Refresh(resolver) | Action::More(resolver) | Action::Method(resolver) => {
                Some(resolver.invoke_with(host, args))
            }
            Action::Cancel {
                debouncer,
                pending_key,
            } => {
                host.write(pending_key, Value::Bool(false));
                debouncer.cancel();
                None
            }
            Action::Now {
                debouncer,
                pending_key,
            } => {
                host.write(pending_key, Value::Bool(false));
                debouncer.flush();
                None
            }
        })
    }

    fn resolve_action(&self, name: &str, role: MetaRole) -> Result<Invocation, ConfigError> {
        let action_name = self.meta.derive(name, role);
        match self.call(&action_name, &[])? {
            Some(invocation) => Ok(invocation),
            None => Err(ConfigError::UnknownAction { name: action_name }),
        }
    }

    pub fn refresh(&self, name: &str) -> Result<Invocation, ConfigError> {
        self.resolve_action(name, MetaRole::Refresh)
    }

    pub fn more(&self, name: &str) -> Result<Invocation, ConfigError> {
        self.resolve_action(name, MetaRole::More)
    }

    pub fn cancel(&self, name: &str) -> Result<(), ConfigError> {
        self.call(&self.meta.derive(name, MetaRole::Cancel), &[])
            .map(|_| ())
    }

    pub fn now(&self, name: &str) -> Result<(), ConfigError> {
        self.call(&self.meta.derive(name, MetaRole::Now), &[])
            .map(|_| ())
    }

    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Invocation, ConfigError> {
        match self.actions.get(name) {
            Some(Action::Method(resolver)) => Ok(resolver.invoke_with(&self.host, args)),
            _ => Err(ConfigError::UnknownAction {
                name: name.to_string(),
            }),
        }
    }

    pub fn state(&self, name: &str) -> ResolutionState {
        ResolutionState::read(&self.host, name, &self.meta)
    }

    /// Tears the binding down. Same as dropping it.
    pub fn unbind(self) {}
}

impl<H: Host> Drop for Bound<H> {
    fn drop(&mut self) {
        for debouncer in &self.debouncers {
            debouncer.cancel();
        }
        for handle in self.watches.drain(..) {
            handle.unsubscribe();
        }
    }
}

impl<H: Host> fmt::Debug for Bound<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bound")
            .field("properties", &self.descriptors)
            .field("actions", &self.action_names())
            .field("watches", &self.watches.len())
            .finish()
    }
}
