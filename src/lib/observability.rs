use std::time::Instant;

use anyhow::{Result, anyhow};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
static START_TIME: OnceCell<Instant> = OnceCell::new();

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

pub fn init() -> Result<()> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("salegraph_http_request_duration_seconds".into()),
            LATENCY_BUCKETS,
        )
        .and_then(|builder| {
            builder.set_buckets_for_metric(
                Matcher::Full("salegraph_event_duration_seconds".into()),
                LATENCY_BUCKETS,
            )
        })
        .map_err(|err| anyhow!("failed to configure prometheus exporter: {err}"))?;
    let handle = builder
        .install_recorder()
        .map_err(|err| anyhow!("failed to initialise prometheus recorder: {err}"))?;

    describe_counter!(
        "salegraph_http_requests_total",
        "Total number of HTTP requests processed by the salegraph server."
    );
    describe_histogram!(
        "salegraph_http_request_duration_seconds",
        "HTTP request latency observed by the salegraph server."
    );
    describe_counter!(
        "salegraph_events_total",
        "Sale events seen by the indexer, by event type and outcome."
    );
    describe_histogram!(
        "salegraph_event_duration_seconds",
        "Time spent applying one sale event, including the store commit."
    );
    describe_counter!(
        "salegraph_store_operations_total",
        "Total number of operations executed by the entity store."
    );
    describe_histogram!(
        "salegraph_store_operation_duration_seconds",
        "Duration of operations executed by the entity store."
    );

    let _ = PROMETHEUS_HANDLE.set(handle);
    let _ = START_TIME.set(Instant::now());
    Ok(())
}

pub async fn metrics_handler() -> Response {
    if PROMETHEUS_HANDLE.get().is_none() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not initialised",
        )
            .into_response();
    }

    let body = render_metrics();
    let headers = [(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    )];
    (StatusCode::OK, headers, body).into_response()
}

pub async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    let method = req.method().as_str().to_owned();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let start = Instant::now();
    let response = next.run(req).await;
    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(
        "salegraph_http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status.clone()
    )
    .increment(1);
    histogram!(
        "salegraph_http_request_duration_seconds",
        "method" => method,
        "path" => path,
        "status" => status
    )
    .record(latency);

    response
}

pub fn render_metrics() -> String {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        let mut body = handle.render();
        if let Some(start) = START_TIME.get() {
            let uptime = start.elapsed().as_secs_f64();
            body.push_str(&format!("salegraph_uptime_seconds{{}} {}\n", uptime));
        }
        body
    } else {
        String::new()
    }
}
