use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the synchronization layer.
///
/// `Authentication` is normally invisible to callers: the transport recovers
/// it in place when stored credentials allow a silent re-login. Everything
/// else propagates.
#[derive(Debug, Error)]
pub enum ClientError {
    /// 401 on a regular endpoint: the presented token is missing or expired.
    #[error("authorization rejected: {0}")]
    Authentication(String),
    /// The token endpoint itself refused the exchange.
    #[error("authentication failed: {0}")]
    AuthExchange(String),
    /// Client-side validation refused the payload; nothing was sent.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Any other non-2xx response.
    #[error("{status}: {message}")]
    Server {
        status: StatusCode,
        message: String,
    },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
