use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use api_types::account::Account;

use crate::{
    caches::CurrencyCache, error::Result, hooks::RefreshHooks, session::AuthSession,
    transport::Transport, util,
};

/// Aggregate balance of all accounts sharing one currency, minor units.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CurrencyTotal {
    pub total_minor: i64,
    pub display_name: Option<String>,
}

#[derive(Debug, Default)]
struct AccountsState {
    accounts: Vec<Account>,
    totals_for_currency: BTreeMap<String, CurrencyTotal>,
}

/// Read model of the account set.
///
/// The server only exchanges the whole collection (no partial patch), so the
/// snapshot and its per-currency totals are rebuilt from scratch on every
/// install; totals are never updated incrementally.
#[derive(Clone)]
pub struct AccountsCache {
    session: AuthSession,
    transport: Transport,
    currencies: CurrencyCache,
    hooks: RefreshHooks,
    state: Arc<Mutex<AccountsState>>,
}

impl AccountsCache {
    pub(crate) fn new(
        session: AuthSession,
        transport: Transport,
        currencies: CurrencyCache,
        hooks: &RefreshHooks,
    ) -> Self {
        let cache = Self {
            session,
            transport,
            currencies,
            hooks: hooks.clone(),
            state: Arc::new(Mutex::new(AccountsState::default())),
        };
        let hook = cache.clone();
        hooks.register_accounts(move || {
            let cache = hook.clone();
            async move { cache.refresh().await }
        });
        cache
    }

    pub fn accounts(&self) -> Vec<Account> {
        util::lock(&self.state).accounts.clone()
    }

    pub fn account(&self, id: i64) -> Option<Account> {
        util::lock(&self.state)
            .accounts
            .iter()
            .find(|account| account.id == Some(id))
            .cloned()
    }

    pub fn totals_for_currency(&self) -> BTreeMap<String, CurrencyTotal> {
        util::lock(&self.state).totals_for_currency.clone()
    }

    fn install(&self, accounts: Vec<Account>) {
        let mut totals: BTreeMap<String, CurrencyTotal> = BTreeMap::new();
        for account in &accounts {
            let entry = totals
                .entry(account.currency.clone())
                .or_insert_with(|| CurrencyTotal {
                    total_minor: 0,
                    display_name: self.currencies.display_name(&account.currency),
                });
            entry.total_minor += account.balance_minor;
        }

        let mut state = util::lock(&self.state);
        state.accounts = accounts;
        state.totals_for_currency = totals;
    }

    pub async fn refresh(&self) {
        if !self.session.authorized() {
            *util::lock(&self.state) = AccountsState::default();
            return;
        }
        match self
            .transport
            .get_json::<Vec<Account>>("service/accounts")
            .await
        {
            Ok(accounts) => self.install(accounts),
            Err(err) => tracing::debug!("account refresh failed: {err}"),
        }
    }

    /// Replaces the whole account set on the server.
    ///
    /// The response is the canonical collection (server-assigned ids and
    /// versions included). Balances may have moved, so cached transaction
    /// state is invalidated through its refresh hook.
    pub async fn submit(&self, accounts: &[Account]) -> Result<Vec<Account>> {
        match self
            .transport
            .post_json::<_, Vec<Account>>("service/accounts", accounts)
            .await
        {
            Ok(accounts) => {
                self.install(accounts.clone());
                self.hooks.update_transactions().await;
                Ok(accounts)
            }
            Err(err) => {
                self.refresh().await;
                Err(err)
            }
        }
    }
}
