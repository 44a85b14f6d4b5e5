use async_trait::async_trait;
use axum::Router;
use shelf_db::DbClient;

/// Context provided to modules during initialization
pub struct InitCtx<'a> {
    pub settings: &'a crate::settings::Settings,
    /// `None` when the in-memory backend is configured
    pub db: Option<&'a DbClient>,
}

/// Core module trait that all shelf modules must implement
#[async_trait]
pub trait Module: Sync + Send {
    /// Unique name for this module
    fn name(&self) -> &'static str;

    /// Initialize the module with the provided context
    /// Called during application startup, before routes are collected
    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Return the Axum router for this module's routes.
    /// Paths are absolute; the router is merged at the root.
    fn routes(&self) -> Router {
        Router::new()
    }

    /// Return the OpenAPI fragment for this module.
    /// Will be merged with other modules' documents
    fn openapi(&self) -> Option<utoipa::openapi::OpenApi> {
        None
    }

    /// Called after every module is initialized
    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Stop the module and clean up resources
    /// Called during application shutdown
    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
