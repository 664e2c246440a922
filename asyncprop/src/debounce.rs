use crate::DebounceSpec;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

struct Timer {
    id: u64,
    token: CancellationToken,
}

struct DebounceState<A> {
    last_args: Option<A>,
    last_call: Option<Instant>,
    last_invoke: Option<Instant>,
    timer: Option<Timer>,
    next_timer_id: u64,
}

struct DebounceInner<A> {
    spec: DebounceSpec,
    func: Arc<dyn Fn(A) + Send + Sync>,
    state: Mutex<DebounceState<A>>,
}

/// Delays calls to a function until `wait` has passed without a new call.
///
/// `leading` fires on the first call of a burst, `trailing` fires once the
/// burst has been quiet for `wait`, and `max_wait` forces a trailing fire
/// during a burst that never goes quiet. The most recent arguments are the
/// ones used. Timers are tokio sleeps, so calls must happen inside a runtime.
///
/// The debouncer owns no property state: clearing a pending flag on
/// [`cancel`](Self::cancel) or [`flush`](Self::flush) is the caller's job.
pub struct Debouncer<A> {
    inner: Arc<DebounceInner<A>>,
}

impl<A> Clone for Debouncer<A> {
    fn clone(&self) -> Self {
        Debouncer {
            inner: self.inner.clone(),
        }
    }
}

impl<A> fmt::Debug for Debouncer<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("spec", &self.inner.spec)
            .field("pending", &self.is_pending())
            .finish()
    }
}

impl<A> Debouncer<A> {
    pub fn spec(&self) -> DebounceSpec {
        self.inner.spec
    }

    /// True while a timer is armed.
    pub fn is_pending(&self) -> bool {
        self.inner.lock().timer.is_some()
    }
}

impl<A> Debouncer<A>
where
    A: Send + 'static,
{
    pub fn new<F>(spec: DebounceSpec, func: F) -> Self
    where
        F: Fn(A) + Send + Sync + 'static,
    {
        Debouncer {
            inner: Arc::new(DebounceInner {
                spec: spec.normalized(),
                func: Arc::new(func),
                state: Mutex::new(DebounceState {
                    last_args: None,
                    last_call: None,
                    last_invoke: None,
                    timer: None,
                    next_timer_id: 0,
                }),
            }),
        }
    }

    pub fn call(&self, args: A) {
        let inner = &self.inner;
        let now = Instant::now();
        let due = {
            let mut state = inner.lock();
            let invoking = state.should_invoke(&inner.spec, now);
            state.last_args = Some(args);
            state.last_call = Some(now);

            if invoking && state.timer.is_none() {
                DebounceInner::leading_edge(inner, &mut state, now)
            } else if invoking && inner.spec.max_wait.is_some() {
                DebounceInner::start_timer(inner, &mut state, inner.spec.wait);
                state.invoke(now)
            } else {
                if state.timer.is_none() {
                    DebounceInner::start_timer(inner, &mut state, inner.spec.wait);
                }
                None
            }
        };
        if let Some(args) = due {
            (inner.func)(args);
        }
    }

    /// Drops the scheduled call, if any, without running it.
    pub fn cancel(&self) {
        let mut state = self.inner.lock();
        if let Some(timer) = state.timer.take() {
            timer.token.cancel();
        }
        state.last_args = None;
        state.last_call = None;
        state.last_invoke = None;
    }

    /// Runs the scheduled call now, as if its timer had elapsed.
    pub fn flush(&self) {
        let due = {
            let mut state = self.inner.lock();
            match state.timer.take() {
                Some(timer) => {
                    timer.token.cancel();
                    state.trailing_edge(&self.inner.spec, Instant::now())
                }
                None => None,
            }
        };
        if let Some(args) = due {
            (self.inner.func)(args);
        }
    }
}

impl<A> DebounceInner<A> {
    fn lock(&self) -> MutexGuard<'_, DebounceState<A>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<A> DebounceInner<A>
where
    A: Send + 'static,
{
    fn leading_edge(this: &Arc<Self>, state: &mut DebounceState<A>, now: Instant) -> Option<A> {
        state.last_invoke = Some(now);
        Self::start_timer(this, state, this.spec.wait);
        if this.spec.leading {
            state.invoke(now)
        } else {
            None
        }
    }

    fn start_timer(this: &Arc<Self>, state: &mut DebounceState<A>, delay: Duration) {
        if let Some(previous) = state.timer.take() {
            previous.token.cancel();
        }
        state.next_timer_id += 1;
        let id = state.next_timer_id;
        let token = CancellationToken::new();
        state.timer = Some(Timer {
            id,
            token: token.clone(),
        });

        let weak: Weak<Self> = Arc::downgrade(this);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(inner) = weak.upgrade() {
                        Self::timer_expired(&inner, id);
                    }
                }
            }
        });
    }

    fn timer_expired(this: &Arc<Self>, id: u64) {
        let due = {
            let mut state = this.lock();
            if state.timer.as_ref().map(|timer| timer.id) != Some(id) {
                return;
            }
            let now = Instant::now();
            if state.should_invoke(&this.spec, now) {
                state.timer = None;
                state.trailing_edge(&this.spec, now)
            } else {
                let remaining = state.remaining_wait(&this.spec, now);
                trace!(?remaining, "debounce window extended");
                Self::start_timer(this, &mut state, remaining);
                None
            }
        };
        if let Some(args) = due {
            (this.func)(args);
        }
    }
}

impl<A> DebounceState<A> {
    fn should_invoke(&self, spec: &DebounceSpec, now: Instant) -> bool {
        let Some(last_call) = self.last_call else {
            return true;
        };
        let since_call = now.saturating_duration_since(last_call);
        if since_call >= spec.wait {
            return true;
        }
        match (spec.max_wait, self.last_invoke) {
            (Some(max_wait), Some(last_invoke)) => {
                now.saturating_duration_since(last_invoke) >= max_wait
            }
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn remaining_wait(&self, spec: &DebounceSpec, now: Instant) -> Duration {
        let since_call = self
            .last_call
            .map(|last_call| now.saturating_duration_since(last_call))
            .unwrap_or(spec.wait);
        let waiting = spec.wait.saturating_sub(since_call);
        match (spec.max_wait, self.last_invoke) {
            (Some(max_wait), Some(last_invoke)) => {
                let since_invoke = now.saturating_duration_since(last_invoke);
                waiting.min(max_wait.saturating_sub(since_invoke))
            }
            _ => waiting,
        }
    }

    fn invoke(&mut self, now: Instant) -> Option<A> {
        self.last_invoke = Some(now);
        self.last_args.take()
    }

    fn trailing_edge(&mut self, spec: &DebounceSpec, now: Instant) -> Option<A> {
        if spec.trailing && self.last_args.is_some() {
            self.invoke(now)
        } else {
            self.last_args = None;
            None
        }
    }
}
