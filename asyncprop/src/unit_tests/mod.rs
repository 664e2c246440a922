use crate::mock::RecordingHost;
use crate::{Concat, Host, MetaNamer, MetaRole, PropertyError, Sinks};
use serde_json::Value;
use std::sync::Arc;

mod meta_test;
mod state_test;
mod view_model_test;

/// Sinks that store a property's fields on a [`RecordingHost`] under the
/// derived names, the way a binding would.
pub fn recording_sinks(name: &str, meta: &MetaNamer, with_pending: bool) -> Sinks<RecordingHost> {
    let value_key = name.to_string();
    let append_key = name.to_string();
    let loading_key = meta.derive(name, MetaRole::Loading);
    let pending_key = meta.derive(name, MetaRole::Pending);
    let error_key = meta.derive(name, MetaRole::Error);
    let reset_event = meta.derive(name, MetaRole::Reset);

    Sinks {
        assign_value: Arc::new(move |host: &RecordingHost, value: Value| {
            host.write(&value_key, value)
        }),
        append_value: Arc::new(move |host: &RecordingHost, concat: &Concat, page: Value| {
            host.update(&append_key, |current| concat.apply(current, page));
        }),
        assign_loading: Arc::new(move |host: &RecordingHost, loading: bool| {
            host.write(&loading_key, Value::Bool(loading))
        }),
        assign_pending: if with_pending {
            Some(Arc::new(move |host: &RecordingHost, pending: bool| {
                host.write(&pending_key, Value::Bool(pending))
            }))
        } else {
            None
        },
        assign_error: Arc::new(move |host: &RecordingHost, error: Option<PropertyError>| {
            let value = error
                .map(|error| Value::String(error.to_string()))
                .unwrap_or(Value::Null);
            host.write(&error_key, value)
        }),
        emit_reset: Some(Arc::new(move |host: &RecordingHost, settled: Value| {
            host.emit(&reset_event, settled)
        })),
    }
}

/// Lets every ready task run without moving the clock.
pub async fn run_pending_tasks() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
