use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};

use crate::{
    alert::AlertSink, error::Result, hooks::RefreshHooks, transport::Transport, util,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
}

/// Durable copy of the access token.
///
/// Only the token is persisted: username and password live in memory for the
/// lifetime of the process, so a restarted client can reuse its session but
/// cannot silently re-login once that token expires.
#[derive(Clone, Debug)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let file: SessionFile = serde_json::from_str(&raw).ok()?;
        file.access_token
    }

    /// Persistence failures are logged and otherwise ignored; the in-memory
    /// session stays valid either way.
    pub fn save(&self, token: &str) {
        let file = SessionFile {
            access_token: Some(token.to_string()),
        };
        if let Err(err) = write_json_file(&self.path, &file) {
            tracing::error!("failed to persist access token: {err}");
        }
    }

    pub fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => tracing::error!("failed to remove persisted token: {err}"),
        }
    }
}

fn write_json_file(path: &Path, file: &SessionFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(file)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)?;
    match fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(&tmp, path)?;
            let _ = fs::remove_file(&tmp);
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
}

/// Credential and token state for one client process.
///
/// The session holds no connection of its own: network work is delegated to
/// the [`Transport`] passed into [`authenticate`](AuthSession::authenticate).
/// Authorization is derived, never stored redundantly: the session is
/// Authorized exactly when a token is present.
#[derive(Clone)]
pub struct AuthSession {
    state: Arc<Mutex<SessionState>>,
    store: TokenStore,
    alerts: AlertSink,
    hooks: RefreshHooks,
}

impl AuthSession {
    pub(crate) fn new(store: TokenStore, alerts: AlertSink, hooks: RefreshHooks) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            store,
            alerts,
            hooks,
        }
    }

    pub fn authorized(&self) -> bool {
        util::lock(&self.state).token.is_some()
    }

    pub fn username(&self) -> Option<String> {
        util::lock(&self.state).username.clone()
    }

    pub(crate) fn token(&self) -> Option<String> {
        util::lock(&self.state).token.clone()
    }

    pub(crate) fn credentials(&self) -> Option<(String, String)> {
        let state = util::lock(&self.state);
        match (&state.username, &state.password) {
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
            _ => None,
        }
    }

    /// Loads a previously persisted token and marks the session Authorized
    /// without validating it against the server; an expired token is
    /// discovered lazily by the first failing call.
    ///
    /// No refresh fan-out happens here: restore runs during construction,
    /// and the facade's `bootstrap` drives the initial refresh.
    pub(crate) fn restore(&self) -> bool {
        let Some(token) = self.store.load() else {
            return false;
        };
        util::lock(&self.state).token = Some(token);
        self.alerts.set_enabled(true);
        tracing::info!("restored persisted session");
        true
    }

    /// Performs the password-grant exchange through `transport`.
    ///
    /// Success replaces username, password and token together and persists
    /// the new token; a fresh login (Unauthenticated → Authorized) fans out a
    /// full cache refresh. Failure leaves the previous state untouched and
    /// returns the error.
    pub async fn authenticate(
        &self,
        transport: &Transport,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let response = transport.token_exchange(username, password).await?;

        let was_authorized = {
            let mut state = util::lock(&self.state);
            let was_authorized = state.token.is_some();
            *state = SessionState {
                username: Some(username.to_string()),
                password: Some(password.to_string()),
                token: Some(response.access_token.clone()),
            };
            was_authorized
        };
        self.store.save(&response.access_token);
        self.alerts.set_enabled(true);
        tracing::info!("authenticated as {username}");

        if !was_authorized {
            self.hooks.refresh_after_auth_change().await;
        }
        Ok(())
    }

    /// Wipes credentials and token from memory and durable storage.
    ///
    /// `reason` is forwarded to the alert sink before it is disabled, so the
    /// notice accompanying a forced logout survives the wipe. Leaving the
    /// Authorized state fans out so every cache resets to empty.
    pub async fn clear(&self, reason: Option<&str>) {
        if let Some(reason) = reason {
            self.alerts.add(reason);
        }

        let was_authorized = {
            let mut state = util::lock(&self.state);
            let was_authorized = state.token.is_some();
            *state = SessionState::default();
            was_authorized
        };
        self.store.clear();
        self.alerts.set_enabled(false);

        if was_authorized {
            self.hooks.refresh_after_auth_change().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("session.json"));

        assert_eq!(store.load(), None);
        store.save("tok-1");
        assert_eq!(store.load(), Some("tok-1".to_string()));
        store.save("tok-2");
        assert_eq!(store.load(), Some("tok-2".to_string()));
        store.clear();
        assert_eq!(store.load(), None);
        store.clear();
    }

    #[test]
    fn restore_without_persisted_token_stays_unauthenticated() {
        let dir = tempfile::tempdir().unwrap();
        let session = AuthSession::new(
            TokenStore::new(dir.path().join("session.json")),
            AlertSink::default(),
            RefreshHooks::default(),
        );
        assert!(!session.restore());
        assert!(!session.authorized());
    }
}
