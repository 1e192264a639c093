use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use fleetops_core::{ListParams, ListResult, ServiceError};

use super::AppState;
use crate::model::*;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sites", post(create_site).get(list_sites))
        .route("/sites/{id}", get(get_site))
        .route("/assets", post(create_asset).get(list_assets))
        .route("/assets/{id}", get(get_asset))
        .route("/component-types", post(create_component_type).get(list_component_types))
        .route("/component-types/{id}", get(get_component_type))
        .route(
            "/component-instances",
            post(create_component_instance).get(list_component_instances),
        )
        .route("/component-instances/{id}", get(get_component_instance))
}

// ── Sites ──

async fn create_site(
    State(svc): State<AppState>,
    Json(input): Json<NewSite>,
) -> Result<Json<Site>, ServiceError> {
    Ok(Json(svc.create_site(input)?))
}

async fn list_sites(
    State(svc): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResult<Site>>, ServiceError> {
    Ok(Json(svc.list_sites(&params)?))
}

async fn get_site(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Site>, ServiceError> {
    Ok(Json(svc.get_site(&id)?))
}

// ── Assets ──

async fn create_asset(
    State(svc): State<AppState>,
    Json(input): Json<NewAsset>,
) -> Result<Json<Asset>, ServiceError> {
    Ok(Json(svc.create_asset(input)?))
}

async fn list_assets(
    State(svc): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResult<Asset>>, ServiceError> {
    Ok(Json(svc.list_assets(&params)?))
}

async fn get_asset(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Asset>, ServiceError> {
    Ok(Json(svc.get_asset(&id)?))
}

// ── Component types ──

async fn create_component_type(
    State(svc): State<AppState>,
    Json(input): Json<NewComponentType>,
) -> Result<Json<ComponentType>, ServiceError> {
    Ok(Json(svc.create_component_type(input)?))
}

async fn list_component_types(
    State(svc): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResult<ComponentType>>, ServiceError> {
    Ok(Json(svc.list_component_types(&params)?))
}

async fn get_component_type(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ComponentType>, ServiceError> {
    Ok(Json(svc.get_component_type(&id)?))
}

// ── Component instances ──

async fn create_component_instance(
    State(svc): State<AppState>,
    Json(input): Json<NewComponentInstance>,
) -> Result<Json<ComponentInstance>, ServiceError> {
    Ok(Json(svc.create_component_instance(input)?))
}

async fn list_component_instances(
    State(svc): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResult<ComponentInstance>>, ServiceError> {
    Ok(Json(svc.list_component_instances(&params)?))
}

async fn get_component_instance(
    State(svc): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ComponentInstance>, ServiceError> {
    Ok(Json(svc.get_component_instance(&id)?))
}
