//! In-process test server.
//!
//! Writes a config file into a temporary directory, loads it the same way
//! the binary does, and runs a gateway on an ephemeral port.

use slauth::auth::AuthService;
use slauth::config::Config;
use slauth::config::validation::validate;
use slauth::db::Database;
use slauth::network::Gateway;
use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// A running test server. Stops when dropped.
pub struct TestServer {
    addr: SocketAddr,
    service: Arc<AuthService>,
    task: JoinHandle<()>,
    _data_dir: TempDir,
}

impl TestServer {
    /// Spawn a server with admin bootstrap (`admin` / `secret`) and no
    /// origin restrictions.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with("").await
    }

    /// Spawn a server with extra TOML appended to the `[listen]` table.
    pub async fn spawn_with(listen_extra: &str) -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let config_path = data_dir.path().join("config.toml");
        let db_path = data_dir.path().join("test.db");

        let config_content = format!(
            r#"
[listen]
address = "127.0.0.1:0"
{listen_extra}

[database]
path = "{db}"

[auth]
token_expire = 3600
login_token_expire = 60

[auth.admin]
enabled = true
username = "admin"
password = "secret"
"#,
            db = db_path.display()
        );
        std::fs::write(&config_path, config_content)?;

        let config = Config::load(&config_path)?;
        validate(&config).map_err(|errors| anyhow::anyhow!("invalid test config: {errors:?}"))?;

        let db = Database::new(&config.database.path).await?;
        let service = Arc::new(AuthService::new(db, config.auth.clone()));
        service.bootstrap_admin().await?;

        let gateway = Gateway::bind(&config.listen, Arc::clone(&service)).await?;
        let addr = gateway.local_addr()?;
        let task = tokio::spawn(async move {
            let _ = gateway.run().await;
        });

        Ok(Self {
            addr,
            service,
            task,
            _data_dir: data_dir,
        })
    }

    /// WebSocket URL of the server.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Direct handle to the service, for assertions on stored state.
    pub fn service(&self) -> &AuthService {
        &self.service
    }

    /// Connect a new client.
    pub async fn connect(&self) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(&self.url(), None).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
