use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use fleetops_core::ServiceError;

use super::AppState;
use crate::model::{DailyUsage, DailyUsageOutcome, ReconcileDay, ReconcileOutcome, RetractRequest};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/daily-usage", post(apply))
        .route("/daily-usage/@retract", post(retract))
        .route("/daily-usage/@reconcile", post(reconcile))
}

async fn apply(
    State(svc): State<AppState>,
    Json(usage): Json<DailyUsage>,
) -> Result<Json<DailyUsageOutcome>, ServiceError> {
    Ok(Json(svc.apply_daily_usage(usage).await?))
}

async fn retract(
    State(svc): State<AppState>,
    Json(req): Json<RetractRequest>,
) -> Result<Json<DailyUsageOutcome>, ServiceError> {
    Ok(Json(svc.retract_daily_usage(req).await?))
}

async fn reconcile(
    State(svc): State<AppState>,
    Json(cmd): Json<ReconcileDay>,
) -> Result<Json<ReconcileOutcome>, ServiceError> {
    Ok(Json(svc.reconcile_day(cmd).await?))
}
