//! Configuration management

use lambda_debugger_runtime::ContextOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default port for the invocation endpoint
pub const DEFAULT_PORT: u16 = 4000;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,

    #[serde(default)]
    pub runtime: ContextOptions,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Directory served at `/`
    #[serde(default)]
    pub ui_dir: Option<PathBuf>,

    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            ui_dir: None,
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    /// Where the pid file and logs live; defaults to the home directory
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            startup_timeout_ms: default_startup_timeout_ms(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_body_limit() -> usize {
    5 * 1024 * 1024
}

fn default_startup_timeout_ms() -> u64 {
    5_000
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// Later sources win: config file, `LAMBDA_DEBUGGER_<SECTION>__<KEY>`,
    /// then plain `PORT`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("lambda-debugger").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("LAMBDA_DEBUGGER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_override_option("server.port", std::env::var("PORT").ok())?
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.body_limit_bytes, 5 * 1024 * 1024);
        assert_eq!(config.runtime.remaining_time_ms, 30_000);
        assert!(config.daemon.state_dir.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nhost = \"127.0.0.1\"\nui_dir = \"/srv/ui\"\n\n[runtime]\nremaining_time_ms = 1000"
        )
        .unwrap();
        file.flush().unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.ui_dir, Some(PathBuf::from("/srv/ui")));
        assert_eq!(config.runtime.remaining_time_ms, 1000);
    }

    #[test]
    fn test_port_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nport = 5000").unwrap();
        file.flush().unwrap();

        std::env::set_var("PORT", "5001");
        let config = Config::load(Some(file.path()));
        std::env::remove_var("PORT");

        assert_eq!(config.unwrap().server.port, 5001);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
