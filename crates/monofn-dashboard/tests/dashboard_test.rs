//! Dashboard Integration Tests
//!
//! Drives the poller tick by tick against an in-memory store and checks what the
//! HTTP endpoints serve in between.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use monofn_common::store::{MemoryStore, ResultStore};
use monofn_common::{InvocationResult, Outcome};
use monofn_dashboard::{DashboardConfig, DashboardServer, DashboardSnapshot, Poller, SharedSnapshot, TickOutcome};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;

const KEY: &str = "monofn-output";

fn ok_record(id: &str, output: Value) -> String {
    serde_json::to_string(&InvocationResult::new(id, Outcome::Ok { output }, Utc::now(), 4)).unwrap()
}

fn error_record(id: &str) -> String {
    serde_json::to_string(&InvocationResult::new(
        id,
        Outcome::error("TypeError", "missing key 'b'"),
        Utc::now(),
        1,
    ))
    .unwrap()
}

struct TestDashboard {
    addr: SocketAddr,
    store: Arc<MemoryStore>,
    poller: Poller,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl TestDashboard {
    async fn start(history_limit: usize) -> Self {
        let store = Arc::new(MemoryStore::new());
        let config = DashboardConfig::default()
            .with_key(KEY)
            .with_refresh(Duration::from_millis(100))
            .with_history_limit(history_limit);
        let shared = SharedSnapshot::new(DashboardSnapshot::empty(KEY));
        let poller = Poller::new(store.clone(), &config, shared.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(DashboardServer::new(shared, config.refresh).serve(listener, async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            store,
            poller,
            _shutdown: tx,
        }
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        Client::new()
            .get(format!("http://{}{}", self.addr, path))
            .send()
            .await
            .unwrap()
    }

    async fn snapshot(&self) -> Value {
        self.get("/api/snapshot").await.json().await.unwrap()
    }
}

#[tokio::test]
async fn test_poller_survives_failed_read_between_successes() {
    let mut dash = TestDashboard::start(500).await;

    dash.store.write(KEY, &ok_record("r1", json!(5))).await.unwrap();
    assert_eq!(dash.poller.tick().await, TickOutcome::Merged { merged: 1, skipped: 0 });

    dash.store.fail_next_reads(1);
    assert!(matches!(dash.poller.tick().await, TickOutcome::Failed(_)));

    let during = dash.snapshot().await;
    assert_eq!(during["summary"]["total"], 1);
    assert_eq!(during["poll"]["consecutiveFailures"], 1);
    assert_eq!(during["poll"]["storeReachable"], false);

    let page = dash.get("/").await.text().await.unwrap();
    assert!(page.contains("Last poll failed"));
    assert!(page.contains("r1"));

    dash.store.write(KEY, &error_record("r2")).await.unwrap();
    assert_eq!(dash.poller.tick().await, TickOutcome::Merged { merged: 1, skipped: 0 });

    let after = dash.snapshot().await;
    assert_eq!(after["summary"]["total"], 2);
    assert_eq!(after["summary"]["ok"], 1);
    assert_eq!(after["summary"]["error"], 1);
    assert_eq!(after["summary"]["errorRate"], 0.5);
    assert_eq!(after["poll"]["consecutiveFailures"], 0);
    assert_eq!(after["poll"]["lastError"], Value::Null);
    assert_eq!(after["latest"]["requestId"], "r2");

    let page = dash.get("/").await.text().await.unwrap();
    assert!(!page.contains("Last poll failed"));
}

#[tokio::test]
async fn test_unchanged_record_is_not_double_counted() {
    let mut dash = TestDashboard::start(500).await;
    dash.store.write(KEY, &ok_record("same", json!(1))).await.unwrap();

    for _ in 0..5 {
        dash.poller.tick().await;
    }

    let snapshot = dash.snapshot().await;
    assert_eq!(snapshot["summary"]["total"], 1);
    assert_eq!(snapshot["recent"].as_array().unwrap().len(), 1);
    assert_eq!(snapshot["poll"]["polls"], 5);
}

#[tokio::test]
async fn test_history_keeps_most_recent_n() {
    let mut dash = TestDashboard::start(3).await;
    for i in 0..6 {
        dash.store
            .append(KEY, &ok_record(&format!("r{}", i), json!(i)), 100)
            .await
            .unwrap();
    }
    dash.poller.tick().await;

    let snapshot = dash.snapshot().await;
    let ids: Vec<&str> = snapshot["recent"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["requestId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["r3", "r4", "r5"]);
    assert_eq!(snapshot["summary"]["total"], 6);
}

#[tokio::test]
async fn test_raw_endpoint() {
    let mut dash = TestDashboard::start(500).await;
    assert_eq!(dash.get("/api/raw").await.status(), StatusCode::NOT_FOUND);

    let record = ok_record("r1", json!({"sum": 5}));
    dash.store.write(KEY, &record).await.unwrap();
    dash.poller.tick().await;

    let body: Value = dash.get("/api/raw").await.json().await.unwrap();
    assert_eq!(body["key"], KEY);
    assert_eq!(body["raw"]["type"], "string");
    assert_eq!(body["raw"]["value"], record);
}

#[tokio::test]
async fn test_health_and_page_before_first_poll() {
    let dash = TestDashboard::start(500).await;

    let health = dash.get("/__health").await;
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(health.text().await.unwrap(), "OK");

    let page = dash.get("/").await;
    assert_eq!(page.status(), StatusCode::OK);
    assert!(page.text().await.unwrap().contains("No invocations recorded yet."));
}
