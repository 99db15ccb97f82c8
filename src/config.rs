//! 環境変数による設定とログ初期化。
//!
//! | 変数 | 既定値 |
//! |---|---|
//! | `BOOKSHELF_API_BASE` | `http://127.0.0.1:8000/` |
//! | `BOOKSHELF_BIND` | `127.0.0.1:8000` |
//! | `BOOKSHELF_DATA` | 未設定（メモリのみ） |
//! | `BOOKSHELF_LOG` | `info` |
//! | `BOOKSHELF_LOG_JSON` | `false` |

use std::net::SocketAddr;
use std::path::PathBuf;

use reqwest::Url;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/";
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

pub const ENV_API_BASE: &str = "BOOKSHELF_API_BASE";
pub const ENV_BIND: &str = "BOOKSHELF_BIND";
pub const ENV_DATA: &str = "BOOKSHELF_DATA";
pub const ENV_LOG: &str = "BOOKSHELF_LOG";
pub const ENV_LOG_JSON: &str = "BOOKSHELF_LOG_JSON";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var} '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// クライアント（ビュー）側の設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base: Url,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw = lookup(ENV_API_BASE).unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Ok(Self {
            api_base: parse_api_base(&raw)?,
        })
    }
}

/// バックエンド側の設定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub data_file: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind = lookup(ENV_BIND).unwrap_or_else(|| DEFAULT_BIND.to_string());
        Ok(Self {
            bind: parse_bind(ENV_BIND, &bind)?,
            data_file: lookup(ENV_DATA)
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    /// コマンドライン引数で待受アドレスを上書きする。
    pub fn with_bind(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.bind = parse_bind("ADDR", raw)?;
        Ok(self)
    }
}

/// ログ出力の設定。出力先は常にstderr（stdoutはMCPが使う）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub filter: String,
    pub json: bool,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            filter: lookup(ENV_LOG).unwrap_or_else(|| "info".to_string()),
            json: lookup(ENV_LOG_JSON)
                .as_deref()
                .and_then(parse_bool)
                .unwrap_or(false),
        }
    }

    pub fn init(&self) {
        let filter = EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new("info"));
        if self.json {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// APIのベースURL。相対結合のため末尾を `/` に揃える。
pub fn parse_api_base(raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        var: ENV_API_BASE,
        value: raw.to_string(),
        reason,
    };
    let mut url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn parse_bind(var: &'static str, raw: &str) -> Result<SocketAddr, ConfigError> {
    raw.trim().parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}
