use axum::Router;

/// A business area served by the daemon under its own path prefix.
pub trait Module: Send + Sync {
    /// Path segment the routes are nested under, also used in logs.
    fn name(&self) -> &str;

    fn routes(&self) -> Router;
}
