use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use fleetops_core::ServiceError;

use super::AppState;
use crate::model::*;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/installations", post(fit))
        .route("/installations/{id}", get(get_installation))
        .route("/installations/{id}/log", get(usage_log))
        .route("/installations/{id}/@remove", post(remove))
        .route("/installations/{id}/@usage", post(record_usage))
        .route("/installations/{id}/@undo", post(undo))
        .route("/assets/{id}/installations", get(active_for_asset))
        .route("/assets/{id}/available-components", get(available_components))
        .route("/component-instances/{id}/active", get(active_for_instance))
        .route("/consumptions", post(consume))
}

// ---------------------------------------------------------------------------
// POST /installations
// ---------------------------------------------------------------------------

async fn fit(
    State(svc): State<AppState>,
    Json(req): Json<FitRequest>,
) -> Result<Json<Installation>, ServiceError> {
    Ok(Json(svc.fit(req).await?))
}

// ---------------------------------------------------------------------------
// GET /installations/{id}, /installations/{id}/log
// ---------------------------------------------------------------------------

async fn get_installation(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Installation>, ServiceError> {
    Ok(Json(svc.get_installation(&id)?))
}

async fn usage_log(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<UsageLogEntry>>, ServiceError> {
    Ok(Json(svc.usage_log(&id)?))
}

// ---------------------------------------------------------------------------
// POST /installations/{id}/@remove, @usage, @undo
// ---------------------------------------------------------------------------

async fn remove(
    State(svc): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RemoveRequest>,
) -> Result<Json<Installation>, ServiceError> {
    Ok(Json(svc.remove(&id, req).await?))
}

async fn record_usage(
    State(svc): State<AppState>,
    Path(id): Path<String>,
    Json(credit): Json<UsageCredit>,
) -> Result<Json<Installation>, ServiceError> {
    Ok(Json(svc.record_usage(&id, credit).await?))
}

async fn undo(
    State(svc): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UndoRequest>,
) -> Result<StatusCode, ServiceError> {
    svc.undo_pending_fit(&id, &req.context).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

async fn active_for_asset(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Installation>>, ServiceError> {
    Ok(Json(svc.list_active_for_asset(&id)?))
}

async fn available_components(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<AvailableComponent>>, ServiceError> {
    Ok(Json(svc.list_available_components_for_asset(&id)?))
}

async fn active_for_instance(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Option<Installation>>, ServiceError> {
    Ok(Json(svc.active_for_instance(&id)?))
}

// ---------------------------------------------------------------------------
// POST /consumptions
// ---------------------------------------------------------------------------

async fn consume(
    State(svc): State<AppState>,
    Json(req): Json<ConsumeRequest>,
) -> Result<Json<UsageLogEntry>, ServiceError> {
    Ok(Json(svc.consume(req).await?))
}
