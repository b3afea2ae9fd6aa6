use std::sync::{Arc, Mutex};

use api_types::currency::CurrencyInfo;

use crate::{hooks::RefreshHooks, session::AuthSession, transport::Transport, util};

/// Read model of the currencies the server supports.
#[derive(Clone)]
pub struct CurrencyCache {
    session: AuthSession,
    transport: Transport,
    state: Arc<Mutex<Vec<CurrencyInfo>>>,
}

impl CurrencyCache {
    pub(crate) fn new(session: AuthSession, transport: Transport, hooks: &RefreshHooks) -> Self {
        let cache = Self {
            session,
            transport,
            state: Arc::new(Mutex::new(Vec::new())),
        };
        let hook = cache.clone();
        hooks.register_currencies(move || {
            let cache = hook.clone();
            async move { cache.refresh().await }
        });
        cache
    }

    pub fn currencies(&self) -> Vec<CurrencyInfo> {
        util::lock(&self.state).clone()
    }

    pub fn display_name(&self, code: &str) -> Option<String> {
        util::lock(&self.state)
            .iter()
            .find(|currency| currency.code == code)
            .map(|currency| currency.display_name.clone())
    }

    pub async fn refresh(&self) {
        if !self.session.authorized() {
            util::lock(&self.state).clear();
            return;
        }
        match self
            .transport
            .get_json::<Vec<CurrencyInfo>>("service/currencies")
            .await
        {
            Ok(currencies) => *util::lock(&self.state) = currencies,
            Err(err) => tracing::debug!("currency refresh failed: {err}"),
        }
    }
}
