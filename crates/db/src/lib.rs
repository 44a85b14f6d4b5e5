//! MongoDB client factory for shelf.
//!
//! A [`DbClient`] is created once at startup, handed to modules through the
//! kernel init context, and shut down explicitly once the HTTP server stops.

use std::time::Duration;

use anyhow::Context;
use mongodb::{
    bson::doc,
    options::{ClientOptions, Credential},
    Client, Collection, Database,
};
use serde::Deserialize;

/// Which gateway implementation backs the book collection.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Mongo,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "DatabaseSettings::default_uri")]
    pub uri: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "DatabaseSettings::default_name")]
    pub name: String,
    #[serde(default = "DatabaseSettings::default_collection")]
    pub collection: String,
    #[serde(default = "DatabaseSettings::default_app_name")]
    pub app_name: String,
    #[serde(default = "DatabaseSettings::default_server_selection_timeout_ms")]
    pub server_selection_timeout_ms: u64,
}

impl DatabaseSettings {
    fn default_uri() -> String {
        "mongodb://127.0.0.1:27017".to_string()
    }

    fn default_name() -> String {
        "Xephyr_Labs_Task".to_string()
    }

    fn default_collection() -> String {
        "Book".to_string()
    }

    fn default_app_name() -> String {
        "shelf".to_string()
    }

    fn default_server_selection_timeout_ms() -> u64 {
        5000
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            uri: Self::default_uri(),
            user: None,
            password: None,
            name: Self::default_name(),
            collection: Self::default_collection(),
            app_name: Self::default_app_name(),
            server_selection_timeout_ms: Self::default_server_selection_timeout_ms(),
        }
    }
}

/// Build driver options from settings. Credentials are attached only when
/// both user and password are configured.
pub async fn client_options(settings: &DatabaseSettings) -> anyhow::Result<ClientOptions> {
    let mut options = ClientOptions::parse(&settings.uri)
        .await
        .with_context(|| "failed to parse MongoDB connection uri")?;

    options.app_name = Some(settings.app_name.clone());
    options.server_selection_timeout =
        Some(Duration::from_millis(settings.server_selection_timeout_ms));

    if let (Some(user), Some(password)) = (&settings.user, &settings.password) {
        let mut credential = Credential::default();
        credential.username = Some(user.clone());
        credential.password = Some(password.clone());
        options.credential = Some(credential);
    }

    Ok(options)
}

/// Shared handle to one MongoDB database.
#[derive(Clone, Debug)]
pub struct DbClient {
    client: Client,
    database: String,
}

impl DbClient {
    /// Create the driver client. The driver connects lazily, so this only
    /// fails on invalid configuration; use [`DbClient::ping`] to probe the
    /// server.
    pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<Self> {
        let options = client_options(settings).await?;
        let client =
            Client::with_options(options).with_context(|| "failed to create MongoDB client")?;

        tracing::info!(
            target: "shelf-db",
            database = %settings.name,
            "MongoDB client created"
        );

        Ok(Self {
            client,
            database: settings.name.clone(),
        })
    }

    pub fn database(&self) -> Database {
        self.client.database(&self.database)
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.database().collection::<T>(name)
    }

    /// Round-trip a `ping` command to verify the server is reachable.
    pub async fn ping(&self) -> anyhow::Result<()> {
        self.database()
            .run_command(doc! { "ping": 1 })
            .await
            .with_context(|| "MongoDB ping failed")?;
        Ok(())
    }

    /// Close pooled connections. Consumes the handle.
    pub async fn shutdown(self) {
        tracing::info!(target: "shelf-db", "closing MongoDB client");
        self.client.shutdown().await;
    }
}
