//! Store connection URL resolution.

use std::fmt;

use thiserror::Error;
use url::Url;

/// Used when no URL is configured.
pub const DEFAULT_STORE_URL: &str = "redis://localhost:6379";

const DEFAULT_REDIS_PORT: u16 = 6379;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreUrl {
    /// Redis: redis://[:password@]host[:port][/db], or rediss:// for TLS.
    Redis {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        db: i64,
        tls: bool,
    },
    /// Ephemeral embedded store: memory://
    Memory,
    /// Embedded store persisted to disk: file:///var/lib/countgate/counters.redb
    File { path: String },
}

#[derive(Debug, Error)]
pub enum StoreUrlError {
    #[error("unsupported store scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid store URL: {0}")]
    InvalidUrl(String),
}

impl StoreUrl {
    pub fn parse(raw: &str) -> Result<Self, StoreUrlError> {
        if raw == "memory://" || raw == "memory:" {
            return Ok(StoreUrl::Memory);
        }

        let url = Url::parse(raw).map_err(|e| StoreUrlError::InvalidUrl(format!("{raw}: {e}")))?;
        match url.scheme() {
            "redis" | "rediss" => {
                let host = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| StoreUrlError::InvalidUrl(format!("{raw}: missing host")))?
                    .to_string();
                let username = Some(url.username())
                    .filter(|u| !u.is_empty())
                    .map(decode);
                let password = url.password().map(decode);
                let db = match url.path().trim_start_matches('/') {
                    "" => 0,
                    n => n.parse::<i64>().map_err(|_| {
                        StoreUrlError::InvalidUrl(format!("{raw}: database must be a number"))
                    })?,
                };
                Ok(StoreUrl::Redis {
                    host,
                    port: url.port().unwrap_or(DEFAULT_REDIS_PORT),
                    username,
                    password,
                    db,
                    tls: url.scheme() == "rediss",
                })
            }
            "memory" => Ok(StoreUrl::Memory),
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| StoreUrlError::InvalidUrl(format!("{raw}: not a file path")))?;
                Ok(StoreUrl::File {
                    path: path.to_string_lossy().into_owned(),
                })
            }
            other => Err(StoreUrlError::UnsupportedScheme(other.to_string())),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            StoreUrl::Redis { tls: true, .. } => "rediss",
            StoreUrl::Redis { tls: false, .. } => "redis",
            StoreUrl::Memory => "memory",
            StoreUrl::File { .. } => "file",
        }
    }

    /// Whether the transport to the store is encrypted.
    pub fn is_tls(&self) -> bool {
        matches!(self, StoreUrl::Redis { tls: true, .. })
    }

    /// Full connection string including credentials. Never log this.
    pub fn connection_string(&self) -> String {
        match self {
            StoreUrl::Redis {
                host,
                port,
                username,
                password,
                db,
                ..
            } => {
                let auth = match (username, password) {
                    (Some(u), Some(p)) => format!("{}:{}@", encode(u), encode(p)),
                    (None, Some(p)) => format!(":{}@", encode(p)),
                    (Some(u), None) => format!("{}@", encode(u)),
                    (None, None) => String::new(),
                };
                format!("{}://{auth}{host}:{port}/{db}", self.scheme())
            }
            StoreUrl::Memory => "memory://".to_string(),
            StoreUrl::File { path } => format!("file://{path}"),
        }
    }
}

impl Default for StoreUrl {
    fn default() -> Self {
        StoreUrl::Redis {
            host: "localhost".to_string(),
            port: DEFAULT_REDIS_PORT,
            username: None,
            password: None,
            db: 0,
            tls: false,
        }
    }
}

/// Redacted form, safe for logs.
impl fmt::Display for StoreUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreUrl::Redis {
                host,
                port,
                password,
                db,
                ..
            } => {
                let auth = if password.is_some() { ":***@" } else { "" };
                write!(f, "{}://{auth}{host}:{port}/{db}", self.scheme())
            }
            StoreUrl::Memory => f.write_str("memory://"),
            StoreUrl::File { path } => write!(f, "file://{path}"),
        }
    }
}

fn decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

fn encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}
