use crate::tracing_setup::tracing_init;
use asyncprop::{AsyncProperties, Fetch, GlobalOptions, MetaNamer, PropertyOptions, ViewModel};
use futures_signals::signal::SignalExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

mod tracing_setup;

fn fetch_profile(id: u64) -> Fetch {
    Fetch::deferred(async move {
        sleep(Duration::from_millis(300)).await;
        json!({ "data": { "id": id, "name": "ferris" } })
    })
}

fn fetch_report() -> Fetch {
    Fetch::deferred(async {
        sleep(Duration::from_millis(200)).await;
        Err::<Value, _>("report service unavailable")
    })
}

fn rename(name: Value) -> Fetch {
    Fetch::deferred(async move {
        sleep(Duration::from_millis(100)).await;
        json!({ "renamed_to": name })
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_init()?;

    let meta = MetaNamer::default();
    let view_model = ViewModel::new();
    view_model.set("user_id", 7);

    tokio::spawn(
        view_model
            .to_signal()
            .map(|fields| fields.get("profile$loading").cloned())
            .dedupe_cloned()
            .for_each(|loading| {
                info!("     Observer | profile$loading is {:?}", loading);
                async {}
            }),
    );

    let bound = AsyncProperties::new(GlobalOptions::new())
        .data(
            "profile",
            PropertyOptions::new()
                .default_value(json!({ "name": "guest" }))
                .get(|vm: &ViewModel| fetch_profile(vm.get("user_id").as_u64().unwrap_or(0))),
        )
        .data(
            "report",
            PropertyOptions::new()
                .lazy(true)
                .error(|_, error| warn!("      Handler | report failed: {}", error))
                .get(|_: &ViewModel| fetch_report()),
        )
        .method(
            "rename",
            PropertyOptions::new().get_with_args(|_: &ViewModel, args: &[Value]| {
                rename(args.first().cloned().unwrap_or(Value::Null))
            }),
        )
        .bind(&view_model)?;

    info!("==========================================");
    info!("  Main thread | actions: {:?}", bound.action_names());
    info!("  Main thread | profile before settling: {}", view_model.get("profile"));
    let state = view_model.settled("profile", &meta).await;
    info!("  Main thread | profile settled: {}", state.value);

    info!("==========================================");
    warn!("report is lazy, nothing was fetched at bind");
    info!("  Main thread | report: {}", view_model.get("report"));
    bound.refresh("report")?.settled().await;
    let state = bound.state("report");
    info!(
        "  Main thread | report: {} error: {:?}",
        state.value, state.error
    );

    info!("==========================================");
    let first = bound.call_method("rename", &[json!("crab")])?;
    let second = bound.call_method("rename", &[json!("ferris")])?;
    info!(
        "  Main thread | renames in flight: {} loading: {}",
        view_model.get("rename$invocations"),
        view_model.get("rename$loading")
    );
    info!("  Main thread | first rename: {:?}", first.settled().await);
    info!("  Main thread | second rename: {:?}", second.settled().await);
    info!(
        "  Main thread | renames in flight: {} loading: {}",
        view_model.get("rename$invocations"),
        view_model.get("rename$loading")
    );

    sleep(Duration::from_millis(10)).await;
    info!("  Main thread | Finish");
    Ok(())
}
