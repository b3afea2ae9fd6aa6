use serde::Deserialize;

use crate::error::Result;

const DEFAULT_CONFIG_PATH: &str = "config/client.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Service root every request path is resolved against.
    pub base_url: String,
    /// OAuth2 client id sent with the password-grant exchange.
    pub client_id: String,
    /// Durable state file holding the persisted access token.
    pub session_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/".to_string(),
            client_id: "quaderno".to_string(),
            session_path: "config/session.json".to_string(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self> {
        Self::from_path(DEFAULT_CONFIG_PATH)
    }

    pub fn from_path(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("QUADERNO"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
