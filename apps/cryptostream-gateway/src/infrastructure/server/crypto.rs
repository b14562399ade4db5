//! Internal market endpoints consumed by the dashboard.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use serde::Serialize;

use super::AppState;
use super::error::ApiError;
use crate::application::services::{BoardView, HistoricalRequest};
use crate::domain::market::{AssetSnapshot, Candle};
use crate::infrastructure::stream::ConnectionState;

/// `GET /api/crypto/live` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveResponse {
    /// Board snapshots and top gainer.
    #[serde(flatten)]
    pub board: BoardView,
    /// Stream state, absent when streaming is disabled.
    pub connection: Option<ConnectionState>,
}

pub(super) async fn historical_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<HistoricalRequest>, QueryRejection>,
) -> Result<Json<Vec<Candle>>, ApiError> {
    let Query(request) = query.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let candles = state.historical.candles(&request).await.map_err(|e| {
        tracing::warn!(error = %e, kind = %e.kind(), "Historical request failed");
        ApiError::from(e)
    })?;
    Ok(Json(candles))
}

pub(super) async fn market_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AssetSnapshot>>, ApiError> {
    let snapshots = state.snapshot.snapshot().await.map_err(|e| {
        tracing::warn!(error = %e, kind = %e.kind(), "Market snapshot failed");
        ApiError::from(e)
    })?;
    Ok(Json(snapshots))
}

pub(super) async fn live_handler(State(state): State<Arc<AppState>>) -> Json<LiveResponse> {
    Json(LiveResponse {
        board: state.board.view(),
        connection: state.stream.as_ref().map(|s| s.connection_state()),
    })
}
