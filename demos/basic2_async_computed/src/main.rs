use crate::tracing_setup::tracing_init;
use asyncprop::{
    AsyncProperties, Fetch, GlobalConfig, GlobalOptions, MetaNamer, PropertyOptions, ViewModel,
    Watch,
};
use futures_signals::signal::SignalExt;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

mod tracing_setup;

fn search(query: Value, page: Value) -> Fetch {
    debug!("      Backend | searching {} page {}", query, page);
    Fetch::deferred(async move {
        sleep(Duration::from_millis(150)).await;
        json!({ "hits": [format!("{}#{}", query.as_str().unwrap_or(""), page)] })
    })
}

async fn type_text(view_model: &ViewModel, text: &str) {
    let mut typed = String::new();
    for c in text.chars() {
        typed.push(c);
        view_model.set("query", typed.as_str());
        sleep(Duration::from_millis(60)).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_init()?;

    let view_model = ViewModel::new();
    view_model.set("query", "");
    view_model.set("page", 1);

    tokio::spawn(
        view_model
            .to_signal()
            .map(|fields| {
                (
                    fields.get("results$pending").cloned(),
                    fields.get("results$loading").cloned(),
                )
            })
            .dedupe_cloned()
            .for_each(|(pending, loading)| {
                info!("     Observer | pending: {:?} loading: {:?}", pending, loading);
                async {}
            }),
    );

    let config = GlobalConfig::from_value(&json!({ "debounce": 250, "transform": null }))?;
    let meta = MetaNamer::default();
    let bound = AsyncProperties::new(GlobalOptions::from_config(config))
        .computed(
            "results",
            PropertyOptions::new()
                .default_value(json!({ "hits": [] }))
                .watch(Watch::field("query"))
                .watch_closely(Watch::field("page"))
                .get(|vm: &ViewModel| search(vm.get("query"), vm.get("page"))),
        )
        .bind(&view_model)?;

    info!("==========================================");
    warn!("typing is debounced: one search for the whole word");
    type_text(&view_model, "ferris").await;
    let state = view_model.settled("results", &meta).await;
    info!("  Main thread | results: {}", state.value);

    info!("==========================================");
    warn!("cancel drops the scheduled search");
    type_text(&view_model, "crab").await;
    bound.cancel("results")?;
    sleep(Duration::from_millis(400)).await;
    info!("  Main thread | results: {}", view_model.get("results"));

    info!("==========================================");
    warn!("now runs the scheduled search right away");
    view_model.set("query", "rust");
    sleep(Duration::from_millis(20)).await;
    bound.now("results")?;
    let state = view_model.settled("results", &meta).await;
    info!("  Main thread | results: {}", state.value);

    info!("==========================================");
    warn!("page is watched closely: no debounce at all");
    view_model.set("page", 2);
    sleep(Duration::from_millis(20)).await;
    let state = view_model.settled("results", &meta).await;
    info!("  Main thread | results: {}", state.value);

    drop(bound);
    info!("  Main thread | Finish");
    Ok(())
}
