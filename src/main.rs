//! slauthd - authentication and session daemon.

use slauth::auth::AuthService;
use slauth::config::Config;
use slauth::config::validation::validate;
use slauth::db::Database;
use slauth::network::Gateway;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var_os("SLAUTH_LOG_JSON").is_some() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "configuration has {} error(s), see above",
            errors.len()
        ));
    }

    info!(
        listen = %config.listen.address,
        database = %config.database.path,
        token_expire = config.auth.token_expire,
        login_token_expire = config.auth.login_token_expire,
        "Starting slauthd"
    );

    // Initialize database
    let db = Database::new(&config.database.path).await.map_err(|e| {
        error!(path = %config.database.path, error = %e, "Failed to open database");
        e
    })?;

    let service = Arc::new(AuthService::new(db, config.auth.clone()));
    if let Some(admin) = service.bootstrap_admin().await? {
        info!(account_id = admin.id, name = %admin.name, "Admin account ready");
    }

    let gateway = Gateway::bind(&config.listen, service).await?;
    gateway.run().await
}
