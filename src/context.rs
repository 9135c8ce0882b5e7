/// Application context and dependency injection
///
/// All shared service handles are constructed once at startup and passed
/// down explicitly; there are no ambient singletons.
use crate::{
    account::AccountManager,
    config::ServerConfig,
    db,
    error::GateResult,
    mailer::Mailer,
    session::{MemorySessionStore, RedisSessionStore, SessionStore},
    token::TokenCodec,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub account_db: SqlitePool,
    pub account_manager: Arc<AccountManager>,
    pub session_store: Arc<dyn SessionStore>,
    pub token_codec: Arc<TokenCodec>,
    pub mailer: Arc<Mailer>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> GateResult<Self> {
        // Validate configuration
        config.validate()?;

        // Initialize account database
        let account_db = db::create_pool(
            &config.database.account_db,
            db::DatabaseOptions {
                max_connections: config.database.max_connections,
                enable_wal: true,
            },
        )
        .await?;

        // Run migrations
        db::run_migrations(&account_db).await?;

        // Test connection
        db::test_connection(&account_db).await?;

        let config = Arc::new(config);

        // Initialize account manager
        let account_manager = Arc::new(AccountManager::new(account_db.clone(), Arc::clone(&config)));

        // Initialize session store
        let session_store: Arc<dyn SessionStore> = match &config.cache.redis_url {
            Some(url) => Arc::new(RedisSessionStore::new(url).await?),
            None => {
                tracing::warn!("no Redis URL configured, using in-process session store");
                Arc::new(MemorySessionStore::new())
            }
        };

        // Initialize token codec
        let token_codec = Arc::new(TokenCodec::new(
            config.authentication.jwt_secret.clone(),
            config.authentication.token_ttl,
        ));

        // Initialize mailer
        let mailer = Arc::new(Mailer::new(config.email.clone())?);

        Ok(Self {
            config,
            account_db,
            account_manager,
            session_store,
            token_codec,
            mailer,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        self.config.service.public_url.clone()
    }
}
