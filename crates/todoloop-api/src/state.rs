//! Application state shared by the CLI commands.

use std::path::PathBuf;

use todoloop_infra::config::{data_dir, load_config, resolve_database_url};
use todoloop_infra::sqlite::{DatabasePool, SqliteUnitOfWork};
use todoloop_types::config::AppConfig;

pub struct AppState {
    pub data_dir: PathBuf,
    pub config: AppConfig,
    pub uow: SqliteUnitOfWork,
}

impl AppState {
    /// Resolve the data directory, load `config.toml`, open the database.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_config(&data_dir).await;
        let db_url = resolve_database_url(&config, &data_dir);
        let pool = DatabasePool::new(&db_url).await?;

        Ok(Self {
            data_dir,
            config,
            uow: SqliteUnitOfWork::new(pool),
        })
    }
}
