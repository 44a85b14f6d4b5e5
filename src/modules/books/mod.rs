pub mod models;
pub mod routes;
pub mod store;

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use axum::Router;
use once_cell::sync::OnceCell;
use shelf_kernel::{settings::StoreBackend, InitCtx, Module};
use utoipa::OpenApi;

use routes::SharedStore;
use store::{MemoryBookStore, MongoBookStore};

/// Book catalog module: owns the `Book` collection and its HTTP routes.
pub struct BooksModule {
    store: OnceCell<SharedStore>,
}

impl BooksModule {
    /// Module whose store is chosen from settings during `init`
    pub const fn new() -> Self {
        Self {
            store: OnceCell::new(),
        }
    }

    /// Module bound to an existing store; `init` keeps it.
    pub fn with_store(store: SharedStore) -> Self {
        Self {
            store: OnceCell::with_value(store),
        }
    }

    pub fn store(&self) -> Option<&SharedStore> {
        self.store.get()
    }
}

impl Default for BooksModule {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "Books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        if self.store.get().is_some() {
            tracing::info!(module = self.name(), "books module using preset store");
            return Ok(());
        }

        let database = &ctx.settings.database;
        let store: SharedStore = match database.backend {
            StoreBackend::Memory => Arc::new(MemoryBookStore::new()),
            StoreBackend::Mongo => {
                let db = ctx
                    .db
                    .ok_or_else(|| anyhow!("mongo backend configured without a database client"))?;
                Arc::new(MongoBookStore::new(db, &database.collection))
            }
        };

        self.store
            .set(store)
            .map_err(|_| anyhow!("books store initialized twice"))?;

        tracing::info!(
            module = self.name(),
            backend = ?database.backend,
            collection = %database.collection,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        match self.store.get() {
            Some(store) => routes::router(store.clone()),
            None => {
                tracing::warn!(module = self.name(), "routes requested before init");
                Router::new()
            }
        }
    }

    fn openapi(&self) -> Option<utoipa::openapi::OpenApi> {
        Some(routes::BooksApi::openapi())
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        if let Some(store) = self.store.get() {
            // An unreachable store must not keep the API from starting
            if let Err(e) = store.prepare().await {
                tracing::warn!(module = self.name(), error = %e, "failed to prepare book collection");
            }
        }
        tracing::info!(module = self.name(), "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create a new instance of the books module
pub fn create_module() -> Arc<dyn Module> {
    Arc::new(BooksModule::new())
}
