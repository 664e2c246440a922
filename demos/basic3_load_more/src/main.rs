use crate::tracing_setup::tracing_init;
use asyncprop::{AsyncProperties, Concat, Fetch, GlobalOptions, PropertyOptions, ViewModel};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

mod tracing_setup;

const PAGE_SIZE: u64 = 3;

fn fetch_page(page: u64) -> Fetch {
    Fetch::deferred(async move {
        sleep(Duration::from_millis(100)).await;
        let start = page * PAGE_SIZE + 1;
        let items: Vec<Value> = (start..start + PAGE_SIZE).map(Value::from).collect();
        json!({ "data": items })
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_init()?;

    let view_model = ViewModel::new();
    let mut events = view_model.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("     Observer | {} with {}", event.name, event.payload);
        }
    });

    let next_page = Arc::new(AtomicU64::new(1));
    let reset_to = next_page.clone();
    let bound = AsyncProperties::new(GlobalOptions::new())
        .data(
            "feed",
            PropertyOptions::new()
                .default_value(json!([]))
                .get(move |_: &ViewModel| {
                    // a full refresh starts paging over
                    reset_to.store(1, Ordering::SeqCst);
                    fetch_page(0)
                })
                .more_with(
                    move |_: &ViewModel| fetch_page(next_page.fetch_add(1, Ordering::SeqCst)),
                    Concat::append(),
                ),
        )
        .bind(&view_model)?;

    info!("==========================================");
    sleep(Duration::from_millis(150)).await;
    info!("  Main thread | feed: {}", view_model.get("feed"));

    for _ in 0..2 {
        let page = bound.more("feed")?.settled().await;
        info!("  Main thread | loaded {:?}", page);
        info!("  Main thread | feed: {}", view_model.get("feed"));
    }

    info!("==========================================");
    warn!("refresh replaces the collection instead of appending");
    bound.refresh("feed")?.settled().await;
    info!("  Main thread | feed: {}", view_model.get("feed"));

    let page = bound.more("feed")?.settled().await;
    info!("  Main thread | loaded {:?}", page);
    info!("  Main thread | feed: {}", view_model.get("feed"));

    sleep(Duration::from_millis(10)).await;
    info!("  Main thread | Finish");
    Ok(())
}
