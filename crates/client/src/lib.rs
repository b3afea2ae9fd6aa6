//! Client-side synchronization layer of the Quaderno personal-finance
//! tracker.
//!
//! The UI above this crate is a thin presentation layer; everything that
//! makes the client resilient lives here. [`Client`] owns an OAuth2
//! password-grant session, a transport that transparently repairs expired
//! authorizations (re-authenticate, replay the failed call once), and a set
//! of server-mirrored read models that are wired together through late-bound
//! refresh hooks so the transport and the caches can call into each other
//! without a construction cycle.

use std::path::PathBuf;

use reqwest::Url;

pub use alert::{Alert, AlertSink};
pub use caches::{
    AccountsCache, ConfigurationCache, CurrencyCache, CurrencyTotal, PageWindow,
    TransactionsCache, UserCache,
};
pub use error::{ClientError, Result};
pub use hooks::RefreshHooks;
pub use ledger::{CurrencyTotals, display_totals, is_balanced, totals_by_currency};
pub use session::{AuthSession, TokenStore};
pub use settings::Settings;
pub use transport::{Body, RequestSpec, Transport};

mod alert;
mod caches;
mod error;
mod hooks;
mod ledger;
mod session;
mod settings;
mod transport;
mod util;

/// The assembled synchronization layer.
pub struct Client {
    session: AuthSession,
    transport: Transport,
    alerts: AlertSink,
    hooks: RefreshHooks,
    user: UserCache,
    accounts: AccountsCache,
    currencies: CurrencyCache,
    transactions: TransactionsCache,
    configuration: ConfigurationCache,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn alerts(&self) -> &AlertSink {
        &self.alerts
    }

    pub fn user(&self) -> &UserCache {
        &self.user
    }

    pub fn accounts(&self) -> &AccountsCache {
        &self.accounts
    }

    pub fn currencies(&self) -> &CurrencyCache {
        &self.currencies
    }

    pub fn transactions(&self) -> &TransactionsCache {
        &self.transactions
    }

    pub fn configuration(&self) -> &ConfigurationCache {
        &self.configuration
    }

    /// `true` while any request is on the wire; drives loading indicators.
    pub fn is_busy(&self) -> bool {
        self.transport.is_busy()
    }

    pub fn pending_requests(&self) -> usize {
        self.transport.pending_requests()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        self.session
            .authenticate(&self.transport, username, password)
            .await
    }

    pub async fn logout(&self) {
        tracing::info!("logging out");
        self.session.clear(None).await;
    }

    /// Runs the initial fan-out for a session restored from disk. A client
    /// that starts unauthenticated gets its first refresh from `login`.
    pub async fn bootstrap(&self) {
        if self.session.authorized() {
            self.hooks.refresh_after_auth_change().await;
        }
    }

    /// Bulk data import. The server rebuilds everything it owns, so a full
    /// resynchronization pass follows.
    pub async fn import_file(&self, file_name: &str, bytes: Vec<u8>) -> Result<()> {
        self.transport
            .post_file("service/import", "file", file_name, bytes)
            .await?;
        self.hooks.update_all_data().await;
        Ok(())
    }
}

/// Two-phase construction for [`Client`].
///
/// `build` wires the pieces in dependency order and registers every refresh
/// hook before returning, so a built client can never invoke an unbound
/// hook.
#[derive(Debug, Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    client_id: Option<String>,
    session_path: Option<PathBuf>,
}

impl ClientBuilder {
    pub fn from_settings(settings: &Settings) -> Self {
        Self::default()
            .base_url(&settings.base_url)
            .client_id(&settings.client_id)
            .session_path(&settings.session_path)
    }

    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_string());
        self
    }

    pub fn client_id(mut self, client_id: &str) -> Self {
        self.client_id = Some(client_id.to_string());
        self
    }

    pub fn session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Client> {
        let defaults = Settings::default();
        let mut base_url = self.base_url.unwrap_or(defaults.base_url);
        let client_id = self.client_id.unwrap_or(defaults.client_id);
        let session_path = self
            .session_path
            .unwrap_or_else(|| PathBuf::from(defaults.session_path));

        // Url::join drops the last segment of a base without a trailing
        // slash, which would silently strip the service root.
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let base_url = Url::parse(&base_url)
            .map_err(|err| ClientError::InvalidUrl(format!("{base_url}: {err}")))?;

        let alerts = AlertSink::default();
        let hooks = RefreshHooks::default();
        let session = AuthSession::new(TokenStore::new(session_path), alerts.clone(), hooks.clone());
        let transport = Transport::new(
            base_url,
            client_id,
            session.clone(),
            alerts.clone(),
            hooks.clone(),
        );

        let currencies = CurrencyCache::new(session.clone(), transport.clone(), &hooks);
        let accounts = AccountsCache::new(
            session.clone(),
            transport.clone(),
            currencies.clone(),
            &hooks,
        );
        let transactions = TransactionsCache::new(
            session.clone(),
            transport.clone(),
            accounts.clone(),
            &hooks,
        );
        let user = UserCache::new(session.clone(), transport.clone(), &hooks);
        let configuration = ConfigurationCache::new(session.clone(), transport.clone(), &hooks);

        session.restore();

        Ok(Client {
            session,
            transport,
            alerts,
            hooks,
            user,
            accounts,
            currencies,
            transactions,
            configuration,
        })
    }
}
