use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use async_graphql::http::GraphQLPlaygroundConfig;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    Extension, Json, Router,
    extract::State,
    middleware,
    response::{Html, IntoResponse},
    routing::get,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use super::{
    config::{ApiConfig, Config},
    engine::Indexer,
    error::{IndexError, Result},
    event::{EventLog, EventPosition},
    graphql::{SaleSchema, build_schema},
    observability::{metrics_handler, track_http_metrics},
    query::QueryService,
    store::EntityStore,
};

#[derive(Clone)]
pub struct AppState {
    indexer: Arc<Indexer>,
}

impl AppState {
    pub fn new(indexer: Arc<Indexer>) -> Self {
        Self { indexer }
    }
}

/// Serves the query surface and, when `events` is given, ingests that log on a
/// blocking task alongside it.
pub async fn run(config: Config, events: Option<PathBuf>) -> Result<()> {
    if !config.api.graphql && !config.api.metrics {
        warn!("GraphQL and metrics are both disabled; only /health will be served");
    }

    let store = Arc::new(EntityStore::open(config.entity_store_path())?);
    let indexer = Arc::new(Indexer::new(Arc::clone(&store)));
    let queries = QueryService::new(Arc::clone(&store), config.list_page_size, config.page_limit);

    let ingest_handle = events.map(|path| {
        let indexer = Arc::clone(&indexer);
        tokio::task::spawn_blocking(move || {
            info!(events = %path.display(), "ingesting event log");
            match EventLog::open(&path).and_then(|log| indexer.ingest(log)) {
                Ok(report) => info!(
                    applied = report.applied,
                    already_applied = report.already_applied,
                    cursor = ?report.cursor,
                    "event log ingested"
                ),
                Err(err) => error!(
                    error = %err,
                    "event ingestion stopped; serving last committed state"
                ),
            }
        })
    });

    let app = router(AppState::new(indexer), queries, &config.api);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(
        "Starting salegraph server on {addr} (graphql={}, metrics={})",
        config.api.graphql, config.api.metrics
    );
    let listener = TcpListener::bind(addr).await?;
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(IndexError::from);

    if let Some(handle) = ingest_handle {
        if !handle.is_finished() {
            info!("server stopped while ingestion is still running; waiting for it to finish");
        }
        if let Err(err) = handle.await {
            warn!("ingestion task failed to join: {err}");
        }
    }

    result
}

pub fn router(state: AppState, queries: QueryService, api: &ApiConfig) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .with_state(state);

    if api.graphql {
        let schema = build_schema(queries);
        let graphql_router = Router::new()
            .route("/graphql", get(graphql_playground).post(graphql_handler))
            .route("/graphql/playground", get(graphql_playground))
            .layer(Extension(schema));
        app = app.merge(graphql_router);
    }

    if api.metrics {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.layer(middleware::from_fn(track_http_metrics))
        .layer(TraceLayer::new_for_http())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    cursor: Option<EventPosition>,
    halted: Option<String>,
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    let cursor = state.indexer.store().cursor()?;
    let halted = state.indexer.halted();
    Ok(Json(HealthResponse {
        status: if halted.is_some() { "halted" } else { "ok" },
        cursor,
        halted,
    }))
}

async fn graphql_handler(
    Extension(schema): Extension<SaleSchema>,
    request: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(request.into_inner()).await.into()
}

async fn graphql_playground() -> impl IntoResponse {
    Html(async_graphql::http::playground_source(
        GraphQLPlaygroundConfig::new("/graphql"),
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
