mod common;

use asyncprop::{
    AsyncProperties, ConfigError, Fetch, GlobalOptions, Invocation, MetaNamer, PropertyOptions,
    ViewModel, Watch,
};
use common::{run_pending_tasks, FakeApi};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn test_search_as_you_type() -> Result<(), ConfigError> {
    let view_model = ViewModel::new();
    view_model.set("query", "");
    let api = FakeApi::with_latency(Duration::from_millis(20));
    let getter_api = api.clone();

    let _bound = AsyncProperties::new(GlobalOptions::new().raw())
        .computed(
            "results",
            PropertyOptions::new()
                .debounce(50u64)
                .default_value(json!([]))
                .watch(Watch::field("query"))
                .get(move |vm: &ViewModel| {
                    let query = vm.get("query");
                    getter_api.respond(json!([query]))
                }),
        )
        .bind(&view_model)?;

    for query in ["f", "fe", "fer", "ferris"] {
        view_model.set("query", query);
        run_pending_tasks().await;
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(view_model.get("results$pending"), json!(true));
    assert_eq!(api.calls(), 0);

    let state = view_model.settled("results", &MetaNamer::default()).await;
    assert_eq!(api.calls(), 1);
    assert_eq!(state.value, json!(["ferris"]));
    assert_eq!(state.error, None);
    Ok(())
}

#[tokio::test]
async fn test_initial_state_on_view_model() -> Result<(), ConfigError> {
    let view_model = ViewModel::new();

    let _bound = AsyncProperties::new(GlobalOptions::new())
        .data(
            "user",
            PropertyOptions::new()
                .lazy(true)
                .default_value(json!({ "name": "guest" }))
                .get(|_: &ViewModel| Value::Null),
        )
        .bind(&view_model)?;

    let snapshot = view_model.snapshot();
    assert_eq!(snapshot.get("user"), Some(&json!({ "name": "guest" })));
    assert_eq!(snapshot.get("user$loading"), Some(&json!(false)));
    assert_eq!(snapshot.get("user$error"), Some(&Value::Null));
    assert_eq!(snapshot.get("user$default"), Some(&json!({ "name": "guest" })));
    Ok(())
}

#[tokio::test]
async fn test_reset_event_on_refresh() -> Result<(), ConfigError> {
    let view_model = ViewModel::new();
    let mut events = view_model.subscribe();
    let pages = Arc::new(AtomicU64::new(0));

    let bound = AsyncProperties::new(GlobalOptions::new().raw())
        .data(
            "feed",
            PropertyOptions::new()
                .lazy(true)
                .get(|_: &ViewModel| Fetch::deferred(async { json!([1, 2, 3]) }))
                .more(move |_: &ViewModel| {
                    let page = pages.fetch_add(1, Ordering::SeqCst);
                    Fetch::deferred(async move { json!([page * 10]) })
                }),
        )
        .bind(&view_model)?;

    bound.refresh("feed")?.settled().await;
    bound.more("feed")?.settled().await;
    bound.more("feed")?.settled().await;
    assert_eq!(view_model.get("feed"), json!([1, 2, 3, 0, 10]));

    let event = events.recv().await.expect("reset was emitted");
    assert_eq!(event.name, "feed$reset");
    assert_eq!(event.payload, json!([1, 2, 3]));
    assert!(events.try_recv().is_err());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_guarded_startup_on_view_model() -> Result<(), ConfigError> {
    let view_model = ViewModel::new();
    let api = FakeApi::new();
    let getter_api = api.clone();

    let _bound = AsyncProperties::new(GlobalOptions::new())
        .startup_guard(Watch::expr(|vm: &ViewModel| json!(vm.get("token").is_string())))
        .data(
            "inbox",
            PropertyOptions::new().get(move |_: &ViewModel| getter_api.respond(json!({ "data": [] }))),
        )
        .bind(&view_model)?;
    run_pending_tasks().await;
    assert_eq!(api.calls(), 0);

    view_model.set("token", "secret");
    run_pending_tasks().await;
    assert_eq!(api.calls(), 1);
    assert_eq!(view_model.get("inbox"), json!([]));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_method_calls_keep_counter_balanced() -> Result<(), ConfigError> {
    let view_model = ViewModel::new();

    let bound = AsyncProperties::new(GlobalOptions::new())
        .method(
            "save",
            PropertyOptions::new().get(|_: &ViewModel| {
                Fetch::deferred(async {
                    tokio::task::yield_now().await;
                    json!(true)
                })
            }),
        )
        .bind(&view_model)?;

    let calls: Vec<Invocation> = (0..2000)
        .map(|_| bound.call_method("save", &[]))
        .collect::<Result<_, _>>()?;
    for call in calls {
        assert_eq!(call.settled().await, Some(json!(true)));
    }

    assert_eq!(view_model.get("save$invocations"), json!(0));
    assert_eq!(view_model.get("save$loading"), json!(false));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_pages_are_all_kept() -> Result<(), ConfigError> {
    let view_model = ViewModel::new();
    let next_page = Arc::new(AtomicU64::new(0));

    let bound = AsyncProperties::new(GlobalOptions::new().raw())
        .data(
            "feed",
            PropertyOptions::new()
                .lazy(true)
                .default_value(json!([]))
                .get(|_: &ViewModel| json!([]))
                .more(move |_: &ViewModel| {
                    let page = next_page.fetch_add(1, Ordering::SeqCst);
                    Fetch::deferred(async move {
                        tokio::task::yield_now().await;
                        json!([page])
                    })
                }),
        )
        .bind(&view_model)?;

    let pages: Vec<Invocation> = (0..500)
        .map(|_| bound.more("feed"))
        .collect::<Result<_, _>>()?;
    for page in pages {
        page.settled().await;
    }

    let mut items: Vec<u64> = view_model
        .get("feed")
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default();
    items.sort_unstable();
    assert_eq!(items, (0..500).collect::<Vec<u64>>());
    assert_eq!(view_model.get("feed$loading"), json!(false));
    Ok(())
}
