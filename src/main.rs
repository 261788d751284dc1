use std::sync::Arc;

use teloxide::adaptors::throttle::Limits;
use teloxide::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kira_store::bot;
use kira_store::cache::CacheRegistry;
use kira_store::config::Config;
use kira_store::database::Database;
use kira_store::groups::GroupMetadataCache;
use kira_store::store::{Backend, MemoryBackend, Stores};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kira_store=info,teloxide=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Kira settings store...");

    let config = Config::from_env();
    info!("Configuration loaded successfully");

    let stores = match &config.mongodb_uri {
        Some(uri) => {
            info!("Connecting to MongoDB...");
            let db = Database::connect(uri, &config.mongodb_database).await?;
            info!("Database connected");
            Stores::new(|spec| -> Arc<dyn Backend> { Arc::new(db.backend(spec)) })
        }
        None => {
            warn!("MONGODB_URI not set, settings are kept in memory and lost on exit");
            Stores::in_memory()
        }
    };

    stores.warm_all().await?;

    let dispatcher = match &config.bot_token {
        Some(token) => {
            let registry = CacheRegistry::new();
            let groups = GroupMetadataCache::new(&registry, config.group_cache.clone());

            // Throttle keeps us inside Telegram's rate limits
            let bot = Bot::new(token).throttle(Limits::default());
            let me = bot.get_me().await?;
            info!("Bot username: @{}", me.username());
            info!("Caches: {:?}", registry.cache_names());

            Some(bot::build_dispatcher(bot, stores.clone(), groups))
        }
        None => {
            warn!("BOT_TOKEN not set, running without Telegram");
            None
        }
    };

    bot::run(&config, stores, dispatcher).await;

    Ok(())
}
