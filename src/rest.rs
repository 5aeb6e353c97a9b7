use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::coalesce::FetchError;
use crate::router::normalize_days;
use crate::types::ResourceRequest;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    days: Option<String>,
}

pub async fn coin_snapshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let request = ResourceRequest::CoinSnapshot { coin_id: id };
    respond(state.resolve(&request).await)
}

pub async fn market_chart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ChartQuery>,
) -> Response {
    let request = ResourceRequest::MarketChart {
        coin_id: id,
        days: normalize_days(query.days),
    };
    respond(state.resolve(&request).await)
}

fn respond(result: Result<Value, FetchError>) -> Response {
    match result {
        Ok(payload) => Json(payload).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
