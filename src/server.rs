//! JSON resources over the collected state.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, Request, State as AxumState};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::debug;

use crate::state::{ClusterState, ConsumerTopic, State};

type SharedState = AxumState<Arc<State>>;

/// Routes of the HTTP interface.
pub fn router(state: Arc<State>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/clusters", get(list_clusters))
        .route("/v1/clusters/{cluster}", get(show_cluster))
        .route("/v1/clusters/{cluster}/topics", get(list_topics))
        .route("/v1/clusters/{cluster}/topics/{topic}", get(show_topic))
        .route("/v1/clusters/{cluster}/consumers", get(list_consumers))
        .route(
            "/v1/clusters/{cluster}/consumers/{consumer}",
            get(show_consumer),
        )
        .fallback(fallback)
        .layer(middleware::from_fn(trace_request))
        .with_state(state)
}

/// Serves [`router`] on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<State>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: bool,
    message: &'static str,
}

#[derive(Debug)]
struct NotFound;

impl IntoResponse for NotFound {
    fn into_response(self) -> Response {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: true,
                message: "not found",
            }),
        )
            .into_response()
    }
}

type Result<T> = std::result::Result<Json<T>, NotFound>;

fn cluster(state: &State, name: &str) -> std::result::Result<Arc<ClusterState>, NotFound> {
    state.cluster(name).ok_or(NotFound)
}

async fn trace_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    debug!(
        method = %method,
        uri = %uri,
        status = response.status().as_u16(),
        elapsed = ?start.elapsed(),
        "Served request",
    );
    response
}

async fn healthz() -> &'static str {
    "."
}

async fn fallback() -> NotFound {
    NotFound
}

#[derive(Debug, Serialize)]
struct ClustersBody {
    clusters: Vec<String>,
}

async fn list_clusters(AxumState(state): SharedState) -> Json<ClustersBody> {
    Json(ClustersBody {
        clusters: state.clusters(),
    })
}

#[derive(Debug, Serialize)]
struct ClusterBody {
    cluster: String,
    brokers: Vec<String>,
    topics: Vec<String>,
    consumers: Vec<String>,
}

async fn show_cluster(
    AxumState(state): SharedState,
    Path(name): Path<String>,
) -> Result<ClusterBody> {
    let cluster = cluster(&state, &name)?;

    Ok(Json(ClusterBody {
        brokers: cluster.brokers(),
        topics: cluster.topics(),
        consumers: cluster.consumer_groups(),
        cluster: name,
    }))
}

#[derive(Debug, Serialize)]
struct TopicsBody {
    cluster: String,
    topics: Vec<String>,
}

async fn list_topics(
    AxumState(state): SharedState,
    Path(name): Path<String>,
) -> Result<TopicsBody> {
    let topics = cluster(&state, &name)?.topics();
    Ok(Json(TopicsBody {
        cluster: name,
        topics,
    }))
}

#[derive(Debug, Serialize)]
struct TopicBody {
    cluster: String,
    topic: String,
    offsets: Vec<i64>,
}

async fn show_topic(
    AxumState(state): SharedState,
    Path((name, topic)): Path<(String, String)>,
) -> Result<TopicBody> {
    let offsets = cluster(&state, &name)?
        .topic_offsets(&topic)
        .ok_or(NotFound)?;

    Ok(Json(TopicBody {
        cluster: name,
        topic,
        offsets,
    }))
}

#[derive(Debug, Serialize)]
struct ConsumersBody {
    cluster: String,
    consumers: Vec<String>,
}

async fn list_consumers(
    AxumState(state): SharedState,
    Path(name): Path<String>,
) -> Result<ConsumersBody> {
    let consumers = cluster(&state, &name)?.consumer_groups();
    Ok(Json(ConsumersBody {
        cluster: name,
        consumers,
    }))
}

#[derive(Debug, Serialize)]
struct ConsumerBody {
    cluster: String,
    consumer: String,
    topics: Vec<ConsumerTopic>,
}

async fn show_consumer(
    AxumState(state): SharedState,
    Path((name, consumer)): Path<(String, String)>,
) -> Result<ConsumerBody> {
    let topics = cluster(&state, &name)?
        .consumer_topics(&consumer)
        .ok_or(NotFound)?;

    Ok(Json(ConsumerBody {
        cluster: name,
        consumer,
        topics,
    }))
}
