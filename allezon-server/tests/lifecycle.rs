//! Server start and graceful shutdown

use std::sync::Arc;
use std::time::Duration;

use allezon_core::{Action, Device, Product, UserTag};
use allezon_server::{AllezonServer, AppState, EngineConfig, ServerConfig};
use chrono::{TimeZone, Utc};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn tag(cookie: &str) -> UserTag {
    UserTag {
        time: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        cookie: cookie.to_string(),
        country: "DE".to_string(),
        device: Device::Mobile,
        action: Action::View,
        origin: "shop".to_string(),
        product: Product {
            product_id: 3,
            brand_id: "b".to_string(),
            category_id: "c".to_string(),
            price: 12,
        },
    }
}

#[tokio::test]
async fn shutdown_drains_pipeline_and_flushes() {
    let engine = EngineConfig::default();
    let state = Arc::new(AppState::new(&engine).unwrap());
    let server = AllezonServer::with_state(
        ServerConfig::new("127.0.0.1", 0),
        engine,
        Arc::clone(&state),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_with_listener(listener, async move {
        let _ = stop_rx.await;
    }));

    for cookie in ["a", "b", "c"] {
        state.ingestor.ingest(tag(cookie)).await.unwrap();
    }
    // Let the forwarders and collectors pick the tags up.
    tokio::time::sleep(Duration::from_millis(300)).await;

    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server should stop")
        .unwrap();
    assert!(result.is_ok());

    assert_eq!(state.accumulator.pending().await, 0);
    assert_eq!(state.profiles.read("a").await.unwrap().views.len(), 1);
}
