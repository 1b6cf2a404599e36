//! Dashboard HTTP server.
//!
//! Serves the last published snapshot. Handlers only clone the snapshot under
//! the read lock and never wait on the store, so a slow or failing poll cannot
//! stall a page load.

use std::fmt::Write as _;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::Json;
use monofn_common::{InvocationResult, MonofnError};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::snapshot::{DashboardSnapshot, RawRead, SharedSnapshot};

#[derive(Clone)]
struct AppState {
    shared: SharedSnapshot,
    refresh: Duration,
}

pub struct DashboardServer {
    state: AppState,
}

impl DashboardServer {
    pub fn new(shared: SharedSnapshot, refresh: Duration) -> Self {
        Self {
            state: AppState { shared, refresh },
        }
    }

    pub fn app(&self) -> axum::Router {
        axum::Router::new()
            .route("/", axum::routing::get(page))
            .route("/api/snapshot", axum::routing::get(snapshot))
            .route("/api/raw", axum::routing::get(raw))
            .route("/__health", axum::routing::get(health_check))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<(), MonofnError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.app();
        info!(
            "Dashboard listening on {}",
            listener
                .local_addr()
                .map_err(|e| MonofnError::Transport(format!("Failed to get local addr: {}", e)))?
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| MonofnError::Transport(format!("Server error: {}", e)))
    }

    pub async fn run<F>(self, addr: SocketAddr, shutdown: F) -> Result<(), MonofnError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| MonofnError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;
        self.serve(listener, shutdown).await
    }
}

async fn page(State(state): State<AppState>) -> Html<String> {
    Html(render_page(&state.shared.load(), state.refresh))
}

async fn snapshot(State(state): State<AppState>) -> Json<DashboardSnapshot> {
    Json(state.shared.load())
}

async fn raw(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.shared.load();
    match snapshot.raw {
        Some(raw) => (StatusCode::OK, Json(json!({ "key": snapshot.key, "raw": raw }))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "key": snapshot.key, "raw": null })),
        ),
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Renders the dashboard page for `snapshot`.
pub fn render_page(snapshot: &DashboardSnapshot, refresh: Duration) -> String {
    let refresh_secs = refresh.as_secs().max(1);
    let summary = &snapshot.summary;
    let mut html = String::with_capacity(4096);

    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <meta http-equiv=\"refresh\" content=\"{refresh_secs}\">\n\
         <title>monofn: {key}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <h1>monofn</h1>\n<p class=\"key\">Results from <code>{key}</code></p>\n",
        key = escape_html(&snapshot.key),
    );

    if let Some(error) = &snapshot.poll.last_error {
        let _ = write!(
            html,
            "<div class=\"banner\">Last poll failed ({} in a row): {}. Showing the last good data.</div>\n",
            snapshot.poll.consecutive_failures,
            escape_html(error),
        );
    }

    html.push_str("<div class=\"cards\">\n");
    card(&mut html, "Total", &summary.total.to_string());
    card(&mut html, "OK", &summary.ok.to_string());
    card(&mut html, "Errors", &summary.error.to_string());
    card(&mut html, "Timeouts", &summary.timeout.to_string());
    card(&mut html, "Error rate", &format!("{:.1}%", summary.error_rate * 100.0));
    card(&mut html, "Mean duration", &format!("{:.1} ms", summary.mean_duration_ms));
    html.push_str("</div>\n");

    let last_success = snapshot
        .poll
        .last_success_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    let _ = write!(
        html,
        "<p class=\"poll\">Polls: {} &middot; last success: {} &middot; store reachable: {}</p>\n",
        snapshot.poll.polls,
        escape_html(&last_success),
        if snapshot.poll.store_reachable { "yes" } else { "no" },
    );

    if snapshot.recent.is_empty() {
        html.push_str("<p class=\"empty\">No invocations recorded yet.</p>\n");
    } else {
        html.push_str(
            "<table>\n<thead><tr><th>Request</th><th>Status</th><th>Started</th>\
             <th>Duration</th><th>Output / Error</th></tr></thead>\n<tbody>\n",
        );
        for result in snapshot.recent.iter().rev() {
            row(&mut html, result);
        }
        html.push_str("</tbody>\n</table>\n");
    }

    if let Some(raw) = &snapshot.raw {
        let text = match raw {
            RawRead::String { value } => value.clone(),
            RawRead::List { values } => values.join("\n"),
        };
        let _ = write!(
            html,
            "<details><summary>Raw value</summary><pre>{}</pre></details>\n",
            escape_html(&text)
        );
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn card(html: &mut String, label: &str, value: &str) {
    let _ = write!(
        html,
        "<div class=\"card\"><div class=\"label\">{}</div><div class=\"value\">{}</div></div>\n",
        label,
        escape_html(value)
    );
}

fn row(html: &mut String, result: &InvocationResult) {
    let detail = match result.output() {
        Some(output) => output.to_string(),
        None => format!(
            "{}: {}",
            result.error_kind().unwrap_or_default(),
            result.error_message().unwrap_or_default()
        ),
    };
    let status = result.status().to_string();
    let _ = write!(
        html,
        "<tr class=\"{status}\"><td><code>{}</code></td><td>{status}</td><td>{}</td><td>{} ms</td><td><code>{}</code></td></tr>\n",
        escape_html(&result.request_id),
        result.started_at.to_rfc3339(),
        result.duration_ms,
        escape_html(&detail),
    );
}

/// Escapes text for use in HTML element content and attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const STYLE: &str = "body{font-family:sans-serif;margin:2rem;color:#222}\
.cards{display:flex;gap:1rem;flex-wrap:wrap}\
.card{border:1px solid #ddd;border-radius:6px;padding:.75rem 1rem;min-width:8rem}\
.label{font-size:.8rem;color:#666}.value{font-size:1.4rem}\
.banner{background:#fff3cd;border:1px solid #e0c56e;padding:.75rem;margin:1rem 0}\
table{border-collapse:collapse;margin-top:1rem;width:100%}\
td,th{border-bottom:1px solid #eee;padding:.3rem .5rem;text-align:left}\
tr.error td,tr.timeout td{background:#fdecea}";
