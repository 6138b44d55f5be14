use std::sync::Arc;

use shuttle_axum::axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::error::SyncError;
use crate::model::{normalize_ticker, NewsRecord};
use crate::store::RecordStore;
use crate::sync::{SyncOrchestrator, SyncOutcome};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator>,
    pub store: Arc<dyn RecordStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/sync", post(sync_ticker))
        .route("/news/{ticker}", get(list_news))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct SyncReq {
    #[serde(default)]
    ticker: String,
}

#[derive(serde::Serialize)]
struct SyncResp {
    summary: String,
    price: f64,
    change: f64,
}

#[derive(serde::Serialize)]
struct MessageResp {
    message: &'static str,
}

#[derive(serde::Serialize)]
struct ErrorResp {
    error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResp { error })).into_response()
}

fn sync_error_status(e: &SyncError) -> StatusCode {
    match e {
        SyncError::InvalidTicker(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn sync_ticker(State(state): State<AppState>, body: Result<Json<SyncReq>, JsonRejection>) -> Response {
    let Json(req) = match body {
        Ok(b) => b,
        Err(rej) => return error_response(StatusCode::BAD_REQUEST, rej.body_text()),
    };

    match state.orchestrator.run(&req.ticker).await {
        Ok(SyncOutcome::Done(report)) => Json(SyncResp {
            summary: report.summary,
            price: report.quote.price,
            change: report.quote.change,
        })
        .into_response(),
        Ok(SyncOutcome::NoNewsFound { .. }) => (
            StatusCode::NOT_FOUND,
            Json(MessageResp {
                message: "No news found",
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(target: "api", error = %e, "sync request failed");
            error_response(sync_error_status(&e), e.to_string())
        }
    }
}

async fn list_news(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Vec<NewsRecord>>, Response> {
    let ticker = normalize_ticker(&ticker).ok_or_else(|| {
        error_response(StatusCode::BAD_REQUEST, "ticker is required".to_string())
    })?;
    match state.store.query(&ticker).await {
        Ok(rows) => Ok(Json(rows)),
        Err(e) => {
            tracing::warn!(target: "api", %ticker, error = %format!("{e:#}"), "news query failed");
            Err(error_response(
                StatusCode::BAD_GATEWAY,
                format!("query failed: {e:#}"),
            ))
        }
    }
}
