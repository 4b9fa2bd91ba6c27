// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Thin HTTP surface over the dispatch queue and the configured views.
//!
//! All algorithmic work lives in the `eventagg` crate; the handlers only
//! decode requests into `insert`/`view` calls.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use eventagg::aggregator::{Aggregator, Param, ViewOutput};
use eventagg::mq::Queue;
use eventagg::Event;

use crate::errors::ApiError;

pub struct AppState {
    pub queue: Arc<Queue>,
    /// Views keyed by the alias they were configured under.
    pub views: HashMap<String, Arc<dyn Aggregator>>,
}

pub type SharedState = Arc<AppState>;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/event", post(insert_event))
        .route("/api/v1/aggregator/:name", get(view_aggregate))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// `POST /api/v1/event` with a JSON event body. A JSON `null` body is the
/// accepted no-op insert.
async fn insert_event(
    State(state): State<SharedState>,
    Json(ev): Json<Option<Event>>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if let Some(ev) = &ev {
        tracing::debug!(event_type = %ev.event_type, ts = ev.time, "incoming event");
    }
    state.queue.insert(ev).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({}))))
}

/// `GET /api/v1/aggregator/:name` forwarding the query string as ordered
/// key/value parameters.
async fn view_aggregate(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<ViewOutput>, ApiError> {
    let aggregator = state
        .views
        .get(&name)
        .ok_or_else(|| ApiError::UnknownAlias(name.clone()))?;

    let params: Vec<Param> = pairs
        .into_iter()
        .map(|(key, value)| Param::new(key, value))
        .collect();
    let output = aggregator.view(&params).await?;
    Ok(Json(output))
}
