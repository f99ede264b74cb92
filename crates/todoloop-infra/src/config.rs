//! Configuration loader for todoloop.
//!
//! Reads `config.toml` from the data directory (`~/.todoloop/` unless
//! `TODOLOOP_DATA_DIR` is set) into [`AppConfig`]. The lenient
//! [`load_config`] falls back to defaults when the file is missing or
//! malformed; [`read_config`] reports the problem instead.

use std::path::{Path, PathBuf};

use todoloop_types::config::AppConfig;
use todoloop_types::error::ConfigError;

use crate::sqlite::pool::default_database_url;

pub const DATA_DIR_ENV: &str = "TODOLOOP_DATA_DIR";
pub const CONFIG_FILE: &str = "config.toml";

/// `$TODOLOOP_DATA_DIR`, else `~/.todoloop`, else `./.todoloop`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".todoloop")
}

/// Read and parse `{data_dir}/config.toml`.
///
/// Returns `Ok(None)` when the file does not exist.
pub async fn read_config(data_dir: &Path) -> Result<Option<AppConfig>, ConfigError> {
    let path = data_dir.join(CONFIG_FILE);
    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            });
        }
    };

    toml::from_str::<AppConfig>(&content)
        .map(|config| Some(config.clamped()))
        .map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

/// Load configuration, falling back to defaults on any problem.
pub async fn load_config(data_dir: &Path) -> AppConfig {
    match read_config(data_dir).await {
        Ok(Some(config)) => config,
        Ok(None) => {
            tracing::debug!(
                "No {CONFIG_FILE} found in {}, using defaults",
                data_dir.display()
            );
            AppConfig::default()
        }
        Err(err) => {
            tracing::warn!("{err}, using defaults");
            AppConfig::default()
        }
    }
}

/// The configured database URL, or the default file in `data_dir`.
pub fn resolve_database_url(config: &AppConfig, data_dir: &Path) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(|| default_database_url(data_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use todoloop_types::config::RetentionPolicy;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        assert!(read_config(tmp.path()).await.unwrap().is_none());
        assert_eq!(load_config(tmp.path()).await, AppConfig::default());
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
database_url = "sqlite:///var/lib/todoloop/app.db"

[chat]
max_tool_cycles = 3

[outbox]
batch_size = 10
retention = "delete"
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.chat.max_tool_cycles, 3);
        assert_eq!(config.chat.history_window, 20);
        assert_eq!(config.outbox.batch_size, 10);
        assert_eq!(config.outbox.retention, RetentionPolicy::Delete);
        assert_eq!(
            resolve_database_url(&config, tmp.path()),
            "sqlite:///var/lib/todoloop/app.db"
        );
    }

    #[tokio::test]
    async fn load_config_clamps_zero_values() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join(CONFIG_FILE),
            "[chat]\nmax_tool_cycles = 0\n\n[outbox]\nbatch_size = 0\n",
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.chat.max_tool_cycles, 1);
        assert_eq!(config.outbox.batch_size, 1);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join(CONFIG_FILE), "this is not { valid toml !!!")
            .await
            .unwrap();

        let err = read_config(tmp.path()).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(load_config(tmp.path()).await, AppConfig::default());
    }

    #[test]
    fn default_database_url_lives_in_data_dir() {
        let tmp = TempDir::new().unwrap();
        let url = resolve_database_url(&AppConfig::default(), tmp.path());
        assert!(url.starts_with("sqlite://"));
        assert!(url.ends_with("todoloop.db"));
    }
}
