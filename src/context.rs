/// Application context and dependency injection
use crate::{
    access::RolePermissionRegistry,
    audit::AuditLedger,
    config::ServerConfig,
    db,
    error::IpamResult,
    ipam::IpInventoryManager,
    sessions::SessionManager,
    users::{PasswordHasher, UserLifecycleManager},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    // Access control
    pub registry: Arc<RolePermissionRegistry>,
    pub sessions: Arc<SessionManager>,
    // Domain managers
    pub users: Arc<UserLifecycleManager>,
    pub ipam: Arc<IpInventoryManager>,
    pub audit: AuditLedger,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> IpamResult<Self> {
        config.validate()?;

        let db = db::create_pool(
            &config.storage.database_path,
            db::DatabaseOptions {
                max_connections: config.storage.max_connections,
                enable_wal: config.storage.enable_wal,
            },
        )
        .await?;

        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let context = Self::with_pool(config, db)?;

        if let Some(bootstrap) = &context.config.bootstrap {
            context.users.ensure_bootstrap_developer(bootstrap).await?;
        }

        Ok(context)
    }

    /// Wire every service onto an existing, migrated pool
    pub fn with_pool(config: ServerConfig, db: SqlitePool) -> IpamResult<Self> {
        let hasher = PasswordHasher::new(config.authentication.password_hashing)?;

        Ok(Self {
            registry: Arc::new(RolePermissionRegistry::new(db.clone())),
            sessions: Arc::new(SessionManager::new(db.clone(), &config.authentication)),
            users: Arc::new(UserLifecycleManager::new(db.clone(), hasher)),
            ipam: Arc::new(IpInventoryManager::new(db.clone())),
            audit: AuditLedger::new(db.clone()),
            config: Arc::new(config),
            db,
        })
    }

    /// In-memory context with cheap password hashing
    pub async fn for_testing() -> IpamResult<Self> {
        let db = db::memory_pool().await?;
        Self::with_pool(ServerConfig::for_testing(), db)
    }
}
