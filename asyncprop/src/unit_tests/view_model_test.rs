use super::run_pending_tasks;
use crate::{Fields, Host, MetaNamer, ViewModel, Watch, WatchCallback, WatchOptions};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn counting_callback() -> (Arc<AtomicUsize>, WatchCallback<ViewModel>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    (
        count,
        Arc::new(move |_: &ViewModel| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )
}

#[test]
fn test_update_reads_and_writes_in_one_step() {
    let view_model = ViewModel::new();

    let first = view_model.update("count", |count| json!(count.as_u64().unwrap_or(0) + 1));
    let second = view_model.update("count", |count| json!(count.as_u64().unwrap_or(0) + 1));

    assert_eq!(first, json!(1));
    assert_eq!(second, json!(2));
    assert_eq!(view_model.get("count"), json!(2));
}

#[test]
fn test_fields_read_and_write() {
    let view_model = ViewModel::new();
    assert_eq!(view_model.get("missing"), Value::Null);

    view_model.set("name", "ferris");
    view_model.merge(vec![
        ("age".to_string(), json!(8)),
        ("name$loading".to_string(), json!(false)),
    ]);

    let snapshot = view_model.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.get("name"), Some(&json!("ferris")));
    assert!(snapshot.contains("name$loading"));
}

#[test]
fn test_with_fields() {
    let fields: Fields = vec![("a", json!(1)), ("b", json!(2))].into_iter().collect();
    let view_model = ViewModel::with_fields(fields);
    assert_eq!(view_model.get("b"), json!(2));
}

#[tokio::test]
async fn test_watch_fires_on_change_only() {
    let view_model = ViewModel::new();
    view_model.set("query", "a");
    let (count, callback) = counting_callback();

    let handle = view_model.watch(&Watch::field("query"), WatchOptions::deep(), callback);
    run_pending_tasks().await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    view_model.set("unrelated", 1);
    run_pending_tasks().await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    view_model.set("query", "ab");
    run_pending_tasks().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    // same value again is not a change
    view_model.set("query", "ab");
    run_pending_tasks().await;
    assert_eq!(count.load(Ordering::SeqCst), 1);

    assert!(handle.is_active());
}

#[tokio::test]
async fn test_watch_sees_change_made_before_task_runs() {
    let view_model = ViewModel::new();
    let (count, callback) = counting_callback();

    let _handle = view_model.watch(&Watch::field("query"), WatchOptions::deep(), callback);
    view_model.set("query", "early");
    run_pending_tasks().await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_watch_immediate_runs_at_registration() {
    let view_model = ViewModel::new();
    let (count, callback) = counting_callback();

    let _handle = view_model.watch(
        &Watch::field("ready"),
        WatchOptions::deep().immediate(true),
        callback,
    );

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_watch_expression_and_field_list() {
    let view_model = ViewModel::new();
    let (expr_count, expr_callback) = counting_callback();
    let (list_count, list_callback) = counting_callback();

    let _expr = view_model.watch(
        &Watch::expr(|vm: &ViewModel| json!(vm.get("a").as_i64().unwrap_or(0) > 10)),
        WatchOptions::deep(),
        expr_callback,
    );
    let _list = view_model.watch(
        &Watch::fields(["a", "b"]),
        WatchOptions::deep(),
        list_callback,
    );

    view_model.set("a", 5);
    run_pending_tasks().await;
    assert_eq!(expr_count.load(Ordering::SeqCst), 0);
    assert_eq!(list_count.load(Ordering::SeqCst), 1);

    view_model.set("a", 11);
    run_pending_tasks().await;
    view_model.set("b", "x");
    run_pending_tasks().await;
    assert_eq!(expr_count.load(Ordering::SeqCst), 1);
    assert_eq!(list_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unsubscribe_stops_callbacks() {
    let view_model = ViewModel::new();
    let (count, callback) = counting_callback();

    let handle = view_model.watch(&Watch::field("query"), WatchOptions::deep(), callback);
    handle.unsubscribe();
    view_model.set("query", "x");
    run_pending_tasks().await;

    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_emit_reaches_subscribers() {
    let view_model = ViewModel::new();
    let mut events = view_model.subscribe();

    view_model.emit("items$reset", json!([1]));

    let event = events.recv().await.unwrap();
    assert_eq!(event.name, "items$reset");
    assert_eq!(event.payload, json!([1]));
}

#[tokio::test(start_paused = true)]
async fn test_settled_waits_for_idle() {
    let view_model = ViewModel::new();
    view_model.set("items", json!([]));
    view_model.set("items$loading", true);

    let writer = view_model.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        writer.set("items", json!([1, 2]));
        writer.set("items$loading", false);
    });

    let state = view_model.settled("items", &MetaNamer::default()).await;
    assert!(!state.loading);
    assert_eq!(state.value, json!([1, 2]));
}
