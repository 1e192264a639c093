use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use fleetops_core::ServiceError;

use super::AppState;
use crate::model::{
    RecordServiceRequest, ScheduleInput, ServiceRecord, ServiceScheduleConfig, ServiceStatus,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/assets/{id}/schedules", get(list_schedules))
        .route(
            "/assets/{id}/schedules/{name}",
            put(upsert_schedule).delete(delete_schedule),
        )
        .route("/assets/{id}/schedules/{name}/@service", post(record_service))
        .route("/assets/{id}/service-status", get(service_status))
        .route("/assets/{id}/service-records", get(service_records))
}

async fn list_schedules(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ServiceScheduleConfig>>, ServiceError> {
    Ok(Json(svc.list_schedules(&id)?))
}

async fn upsert_schedule(
    State(svc): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Json(input): Json<ScheduleInput>,
) -> Result<Json<ServiceScheduleConfig>, ServiceError> {
    Ok(Json(svc.upsert_schedule(&id, &name, input).await?))
}

async fn delete_schedule(
    State(svc): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<StatusCode, ServiceError> {
    svc.delete_schedule(&id, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn record_service(
    State(svc): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Json(req): Json<RecordServiceRequest>,
) -> Result<Json<ServiceScheduleConfig>, ServiceError> {
    Ok(Json(svc.record_service(&id, &name, req).await?))
}

async fn service_status(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ServiceStatus>>, ServiceError> {
    Ok(Json(svc.evaluate(&id)?))
}

async fn service_records(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ServiceRecord>>, ServiceError> {
    Ok(Json(svc.service_history(&id)?))
}
