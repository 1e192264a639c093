mod catalog;
mod installations;
mod reports;
mod schedules;
mod usage;

use std::sync::Arc;

use axum::Router;

use crate::service::EquipmentService;

/// Shared handler state.
pub type AppState = Arc<EquipmentService>;

/// Build the complete equipment router.
///
/// Routes:
/// - `POST|GET /sites`, `/assets`, `/component-types`, `/component-instances`
/// - `GET      /sites/{id}`, `/assets/{id}`, `/component-types/{id}`, `/component-instances/{id}`
/// - `POST     /installations`                      : fit
/// - `GET      /installations/{id}`                 : get installation
/// - `GET      /installations/{id}/log`             : usage log
/// - `POST     /installations/{id}/@remove`         : remove
/// - `POST     /installations/{id}/@usage`          : record usage for one day
/// - `POST     /installations/{id}/@undo`           : undo a pending fit
/// - `GET      /assets/{id}/installations`          : active installations
/// - `GET      /assets/{id}/available-components`   : fittable stock
/// - `GET      /component-instances/{id}/active`    : active installation or null
/// - `POST     /consumptions`                       : type-only consumption
/// - `POST     /daily-usage`                        : apply daily entry
/// - `POST     /daily-usage/@retract`               : withdraw daily entry
/// - `POST     /daily-usage/@reconcile`             : entry with fits/removes
/// - `GET      /assets/{id}/schedules`              : schedule configs
/// - `PUT|DELETE /assets/{id}/schedules/{name}`     : configure / delete
/// - `POST     /assets/{id}/schedules/{name}/@service`: record a service
/// - `GET      /assets/{id}/service-status`         : evaluate
/// - `GET      /assets/{id}/service-records`        : service history
/// - `GET      /reports/installations`, `/reports/by-asset`, `/reports/by-site`
pub fn router(svc: AppState) -> Router {
    Router::new()
        .merge(catalog::routes())
        .merge(installations::routes())
        .merge(usage::routes())
        .merge(schedules::routes())
        .merge(reports::routes())
        .with_state(svc)
}
