use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};

use fleetops_core::ServiceError;

use super::AppState;
use crate::model::{InstallationReportRow, ReportFilter, UsageSummary};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reports/installations", get(installations))
        .route("/reports/by-asset", get(by_asset))
        .route("/reports/by-site", get(by_site))
}

async fn installations(
    State(svc): State<AppState>,
    Query(filter): Query<ReportFilter>,
) -> Result<Json<Vec<InstallationReportRow>>, ServiceError> {
    Ok(Json(svc.installation_report(&filter)?))
}

async fn by_asset(State(svc): State<AppState>) -> Result<Json<Vec<UsageSummary>>, ServiceError> {
    Ok(Json(svc.usage_by_asset()?))
}

async fn by_site(State(svc): State<AppState>) -> Result<Json<Vec<UsageSummary>>, ServiceError> {
    Ok(Json(svc.usage_by_site()?))
}
