use anyhow::Context;
use shelf_db::DbClient;
use shelf_kernel::{
    settings::{Settings, StoreBackend},
    InitCtx, ModuleRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().with_context(|| "failed to load shelf settings")?;
    shelf_telemetry::init(&settings.telemetry)?;

    tracing::info!(
        env = ?settings.environment,
        backend = ?settings.database.backend,
        "shelf-app bootstrap starting"
    );

    let db = match settings.database.backend {
        StoreBackend::Mongo => {
            let db = DbClient::connect(&settings.database).await?;
            match db.ping().await {
                Ok(()) => tracing::info!("connected to MongoDB"),
                Err(e) => tracing::warn!(
                    error = %format!("{:#}", e),
                    "MongoDB unreachable at startup; store requests will fail until it recovers"
                ),
            }
            Some(db)
        }
        StoreBackend::Memory => None,
    };

    let mut registry = ModuleRegistry::new();
    shelf_app::register_all(&mut registry);

    let ctx = InitCtx {
        settings: &settings,
        db: db.as_ref(),
    };
    registry.init_all(&ctx).await?;
    registry.start_all(&ctx).await?;

    tracing::info!("shelf-app bootstrap complete");
    let served = shelf_http::start_server(&registry, &settings).await;

    registry.stop_all().await?;
    if let Some(db) = db {
        db.shutdown().await;
    }

    served
}
