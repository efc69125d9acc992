//! Application Startup
//!
//! Wires repositories, the key lifecycle manager and the token services, and
//! runs the rotation scheduler next to the operational HTTP endpoints until
//! shutdown.

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::application::services::{
    AccountService, AccountServiceImpl, AuthService, KeyLifecycleManager, KeyPolicy,
    RotationScheduler, TokenAuthenticator,
};
use crate::config::Settings;
use crate::infrastructure::cache::{self, RedisRotationLock};
use crate::infrastructure::database;
use crate::infrastructure::repositories::{PgKeyRepository, PgUserRepository};
use crate::presentation::create_router;
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::snowflake::SnowflakeGenerator;

/// Services built at startup
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthService>,
    pub accounts: Arc<dyn AccountService>,
    pub keys: Arc<KeyLifecycleManager<PgKeyRepository>>,
    pub ids: Arc<SnowflakeGenerator>,
    pub settings: Arc<Settings>,
}

/// Application instance
pub struct Application {
    state: AppState,
    listener: TcpListener,
    router: Router,
    scheduler: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        // Create database pool
        let db = database::create_pool(&settings.database).await?;
        database::run_migrations(&db).await?;
        info!("Database connection pool created");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let key_repo = Arc::new(PgKeyRepository::new(db.clone()));
        let user_repo = Arc::new(PgUserRepository::new(db));

        let mut keys =
            KeyLifecycleManager::new(key_repo, clock.clone(), KeyPolicy::from(&settings.keystore));
        if let Some(url) = &settings.redis.url {
            let conn = cache::create_redis_client(url).await?;
            keys = keys.with_rotation_lock(Arc::new(RedisRotationLock::from_settings(
                conn,
                &settings.redis,
            )));
        } else {
            info!("No Redis configured, rotation is serialized in-process only");
        }
        let keys = Arc::new(keys);

        // Refuse to start on an unreachable or corrupt key store.
        keys.current_data_key().await?;
        info!("Key store ready");

        let ids = Arc::new(SnowflakeGenerator::new(settings.snowflake.shard_id));

        let auth: Arc<dyn AuthService> = Arc::new(TokenAuthenticator::new(
            keys.clone(),
            user_repo.clone(),
            clock.clone(),
            chrono::Duration::days(settings.session.token_lifetime_days),
        ));
        let accounts: Arc<dyn AccountService> = Arc::new(AccountServiceImpl::new(
            user_repo,
            auth.clone(),
            ids.clone(),
            clock,
            settings.accounts.handle_domain.clone(),
        ));

        let router = create_router(auth.clone(), keys.clone());
        let listener = TcpListener::bind(settings.server.addr()).await?;
        info!("Listening on {}", listener.local_addr()?);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let scheduler = RotationScheduler::spawn(
            keys.clone(),
            std::time::Duration::from_secs(settings.keystore.check_interval_secs),
            shutdown_rx,
        );

        let state = AppState {
            auth,
            accounts,
            keys,
            ids,
            settings: Arc::new(settings),
        };

        Ok(Self {
            state,
            listener,
            router,
            scheduler,
            shutdown,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until Ctrl-C, then stop the scheduler
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        signal_shutdown(&self.shutdown);
        self.scheduler.await?;
        info!("Rotation scheduler stopped");
        Ok(())
    }
}

/// Ask the rotation scheduler to stop. `false` if it had already exited.
fn signal_shutdown(shutdown: &watch::Sender<bool>) -> bool {
    match shutdown.send(true) {
        Ok(()) => true,
        Err(_) => {
            debug!("Rotation scheduler already stopped");
            false
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}
