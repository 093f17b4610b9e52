//! Typed configuration resolved from CLI flags, `PRINTARR_`-prefixed env
//! vars, and defaults, mirroring the teacher's `AppConfig` const-struct
//! pattern plus the launcher-root CLI/env fallback used in `pumas-rpc`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 3333;
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: i64 = 3;
pub const MIN_MAX_CONCURRENT_DOWNLOADS: i64 = 1;
pub const MAX_MAX_CONCURRENT_DOWNLOADS: i64 = 10;

/// Paths the system reads/writes, per spec.md §6 Filesystem layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Holds the catalog database, encrypted credentials, session files.
    pub config_path: PathBuf,
    /// Holds `staging/<design_id>/…` in-flight downloads.
    pub data_path: PathBuf,
    /// Organised output, `<template-resolved>/…`.
    pub library_path: PathBuf,
    /// Holds `previews/<design_id>/` rendered/extracted preview images.
    pub cache_path: PathBuf,
}

impl PathsConfig {
    pub fn staging_dir(&self, design_id: &str) -> PathBuf {
        self.data_path.join("staging").join(design_id)
    }

    pub fn preview_dir(&self, design_id: &str) -> PathBuf {
        self.cache_path.join("previews").join(design_id)
    }

    pub fn database_path(&self) -> PathBuf {
        self.config_path.join("printarr.sqlite3")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Fully resolved process configuration: CLI > env (`PRINTARR_*`) > default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintarrConfig {
    pub paths: PathsConfig,
    pub network: NetworkConfig,
    pub debug: bool,
    pub log_level: String,
    pub database_url: Option<String>,
}

/// One resolved field, with CLI > env precedence, matching the teacher's
/// `launcher_root` fallback logic in `pumas-rpc::main`.
fn resolve_string(cli: Option<String>, env_key: &str, default: &str) -> String {
    cli.or_else(|| std::env::var(env_key).ok())
        .unwrap_or_else(|| default.to_string())
}

fn resolve_path(cli: Option<PathBuf>, env_key: &str, default: PathBuf) -> PathBuf {
    cli.or_else(|| std::env::var(env_key).ok().map(PathBuf::from))
        .unwrap_or(default)
}

impl PrintarrConfig {
    /// `cli` carries only the flags the binary actually exposes; every
    /// other field is resolved from `PRINTARR_*` env vars or a default.
    pub fn resolve(cli: CliOverrides) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let default_root = home.join(".printarr");

        let config_path = resolve_path(
            cli.config_path,
            "PRINTARR_CONFIG_PATH",
            default_root.join("config"),
        );
        let data_path = resolve_path(
            cli.data_path,
            "PRINTARR_DATA_PATH",
            default_root.join("data"),
        );
        let library_path = resolve_path(
            cli.library_path,
            "PRINTARR_LIBRARY_PATH",
            default_root.join("library"),
        );
        let cache_path = resolve_path(
            cli.cache_path,
            "PRINTARR_CACHE_PATH",
            default_root.join("cache"),
        );

        let host = resolve_string(cli.host, "PRINTARR_HOST", "127.0.0.1");
        let port = cli
            .port
            .or_else(|| {
                std::env::var("PRINTARR_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(DEFAULT_PORT);

        let debug = cli.debug
            || std::env::var("PRINTARR_DEBUG")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false);

        let log_level = resolve_string(cli.log_level, "PRINTARR_LOG_LEVEL", "info");
        let database_url = cli.database_url.or_else(|| std::env::var("PRINTARR_DATABASE_URL").ok());

        Self {
            paths: PathsConfig {
                config_path,
                data_path,
                library_path,
                cache_path,
            },
            network: NetworkConfig { host, port },
            debug,
            log_level,
            database_url,
        }
    }
}

/// CLI-sourced overrides, populated by `printarr-server`'s `clap::Parser`
/// args before being layered under env/defaults in [`PrintarrConfig::resolve`].
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
    pub library_path: Option<PathBuf>,
    pub cache_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub debug: bool,
    pub log_level: Option<String>,
    pub database_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_is_3333() {
        assert_eq!(DEFAULT_PORT, 3333);
    }

    #[test]
    fn resolve_falls_back_to_defaults_without_cli_or_env() {
        let cfg = PrintarrConfig::resolve(CliOverrides::default());
        assert_eq!(cfg.network.port, DEFAULT_PORT);
        assert_eq!(cfg.network.host, "127.0.0.1");
    }

    #[test]
    fn cli_override_wins_over_default() {
        let cfg = PrintarrConfig::resolve(CliOverrides {
            port: Some(9000),
            ..Default::default()
        });
        assert_eq!(cfg.network.port, 9000);
    }
}
