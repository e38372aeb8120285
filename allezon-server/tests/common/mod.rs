//! Shared test utilities for allezon-server integration tests

use std::sync::Arc;
use std::time::Duration;

use allezon_core::AggregateTable;
use allezon_log::LogConfig;
use allezon_server::{AppState, EngineConfig, Pipeline, create_router};
use axum_test::TestServer;
use serde_json::{Value, json};

/// Router, state and running pipeline over fresh in-memory storage
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub pipeline: Pipeline,
}

impl TestApp {
    pub async fn start() -> Self {
        let engine = EngineConfig {
            log: LogConfig::default().with_poll_timeout(Duration::from_millis(10)),
            ..EngineConfig::default()
        };
        let state = Arc::new(AppState::new(&engine).unwrap());
        let pipeline = Pipeline::start(&state, &engine.log).await.unwrap();
        let server = TestServer::new(create_router(state.clone())).unwrap();

        Self {
            server,
            state,
            pipeline,
        }
    }

    /// POST /aggregates, retrying until `ready` accepts the table or two seconds pass
    #[allow(dead_code)]
    pub async fn aggregates_until(
        &self,
        params: &[(&str, &str)],
        ready: impl Fn(&AggregateTable) -> bool,
    ) -> AggregateTable {
        let mut table = self.aggregates(params).await;
        for _ in 0..200 {
            if ready(&table) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            table = self.aggregates(params).await;
        }
        table
    }

    #[allow(dead_code)]
    pub async fn aggregates(&self, params: &[(&str, &str)]) -> AggregateTable {
        let mut request = self.server.post("/aggregates");
        for (key, value) in params {
            request = request.add_query_param(key, value);
        }
        let response = request.await;
        response.assert_status_ok();
        response.json()
    }
}

/// JSON body of a tag
#[allow(dead_code)]
pub fn tag_body(time: &str, cookie: &str, action: &str, brand_id: &str, price: i32) -> Value {
    json!({
        "time": time,
        "cookie": cookie,
        "country": "PL",
        "device": "PC",
        "action": action,
        "origin": "shop1",
        "product_info": {
            "product_id": 42,
            "brand_id": brand_id,
            "category_id": "c1",
            "price": price
        }
    })
}
