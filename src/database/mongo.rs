//! MongoDB database wrapper.

use mongodb::bson::Document;
use mongodb::{Client, options::ClientOptions};
use tracing::info;

use super::MongoBackend;
use crate::store::StoreSpec;

/// Database wrapper for MongoDB operations.
#[derive(Debug, Clone)]
pub struct Database {
    db: mongodb::Database,
}

impl Database {
    /// Connect to MongoDB with the given URI and database name.
    ///
    /// # Errors
    /// Returns error if the URI is invalid or the server does not answer a ping.
    pub async fn connect(uri: &str, db_name: &str) -> anyhow::Result<Self> {
        let options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(options)?;

        // Ping the database to verify connection
        client
            .database("admin")
            .run_command(mongodb::bson::doc! { "ping": 1 })
            .await?;

        info!("Successfully connected to MongoDB");

        Ok(Self {
            db: client.database(db_name),
        })
    }

    /// Adapter for the collection backing `spec`.
    pub fn backend(&self, spec: &'static StoreSpec) -> MongoBackend {
        MongoBackend::new(self.db.collection::<Document>(spec.collection), spec.name)
    }
}
