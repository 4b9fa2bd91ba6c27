// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use eventagg::aggregator::AggregatorError;
use eventagg::mq::QueueError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("aggregator error: {0}")]
    Aggregator(#[from] AggregatorError),

    #[error("no aggregator with name: {0}")]
    UnknownAlias(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::UnknownAlias(name) => (
                StatusCode::BAD_REQUEST,
                format!("no aggregator with name: {name}"),
            ),
            ApiError::Aggregator(err @ AggregatorError::TimeParse { .. }) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            ApiError::Aggregator(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::Queue(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
