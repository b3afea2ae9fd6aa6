use std::sync::{Arc, Mutex};

use api_types::transaction::Transaction;

use crate::{
    caches::AccountsCache,
    error::{ClientError, Result},
    hooks::RefreshHooks,
    ledger,
    session::AuthSession,
    transport::{RequestSpec, Transport},
    util,
};

/// Pagination window over the transaction list, 1-based on the client side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageWindow {
    pub current_page: u32,
    pub total_pages: u32,
}

impl Default for PageWindow {
    fn default() -> Self {
        Self {
            current_page: 1,
            total_pages: 0,
        }
    }
}

#[derive(Debug, Default)]
struct TransactionsState {
    transactions: Vec<Transaction>,
    window: PageWindow,
}

/// Paginated read model of the transaction list.
///
/// Account balances depend on transaction contents, so every snapshot
/// install that may reflect changed data also refreshes the account cache.
#[derive(Clone)]
pub struct TransactionsCache {
    session: AuthSession,
    transport: Transport,
    accounts: AccountsCache,
    state: Arc<Mutex<TransactionsState>>,
}

impl TransactionsCache {
    pub(crate) fn new(
        session: AuthSession,
        transport: Transport,
        accounts: AccountsCache,
        hooks: &RefreshHooks,
    ) -> Self {
        let cache = Self {
            session,
            transport,
            accounts,
            state: Arc::new(Mutex::new(TransactionsState::default())),
        };
        let hook = cache.clone();
        hooks.register_transactions(move || {
            let cache = hook.clone();
            async move { cache.refresh().await }
        });
        cache
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        util::lock(&self.state).transactions.clone()
    }

    pub fn page_window(&self) -> PageWindow {
        util::lock(&self.state).window
    }

    // Client pages are 1-based; the server addresses them from 0.
    fn page_path(page: u32) -> String {
        format!("service/transactions/page_{}", page - 1)
    }

    /// Refetches the current page and the total page count. The two queries
    /// fail independently; either failure leaves its half of the state
    /// untouched.
    pub async fn refresh(&self) {
        if !self.session.authorized() {
            *util::lock(&self.state) = TransactionsState::default();
            return;
        }
        self.refresh_page().await;
        self.refresh_count().await;
    }

    async fn refresh_page(&self) {
        let page = util::lock(&self.state).window.current_page;
        match self
            .transport
            .get_json::<Vec<Transaction>>(&Self::page_path(page))
            .await
        {
            Ok(transactions) => {
                util::lock(&self.state).transactions = transactions;
                self.accounts.refresh().await;
            }
            Err(err) => tracing::debug!("transaction page refresh failed: {err}"),
        }
    }

    async fn refresh_count(&self) {
        match self
            .transport
            .get_json::<u32>("service/transactions/pages")
            .await
        {
            Ok(total_pages) => {
                let mut state = util::lock(&self.state);
                state.window.total_pages = total_pages;
                state.window.current_page = state.window.current_page.min(total_pages.max(1));
            }
            Err(err) => tracing::debug!("transaction count refresh failed: {err}"),
        }
    }

    /// Moves the window to `page`, clamped to `1..=max(total_pages, 1)`.
    pub async fn set_page(&self, page: u32) {
        {
            let mut state = util::lock(&self.state);
            let upper = state.window.total_pages.max(1);
            state.window.current_page = page.clamp(1, upper);
        }
        self.refresh_page().await;
        self.refresh_count().await;
    }

    fn replace_local(&self, transaction: &Transaction) -> bool {
        let mut state = util::lock(&self.state);
        match state
            .transactions
            .iter_mut()
            .find(|tx| tx.id.is_some() && tx.id == transaction.id)
        {
            Some(slot) => {
                *slot = transaction.clone();
                true
            }
            None => false,
        }
    }

    /// Refetches a single transaction. A transaction still on the current
    /// page is replaced in place; one that moved pages falls back to a full
    /// page refresh.
    pub async fn update_one(&self, id: i64) -> Result<Transaction> {
        let transaction = self
            .transport
            .get_json::<Transaction>(&format!("service/transactions/{id}"))
            .await?;
        if self.replace_local(&transaction) {
            self.accounts.refresh().await;
        } else {
            self.refresh_page().await;
        }
        Ok(transaction)
    }

    /// Creates or updates a transaction.
    ///
    /// The transfer balance invariant is enforced first; an unbalanced
    /// transfer is rejected without anything being sent.
    pub async fn submit(&self, transaction: &Transaction) -> Result<Transaction> {
        if !ledger::is_balanced(transaction, &self.accounts.accounts()) {
            return Err(ClientError::Validation(
                "transfer amounts do not balance per currency".to_string(),
            ));
        }

        match self
            .transport
            .post_json::<_, Transaction>("service/transactions/submit", transaction)
            .await
        {
            Ok(transaction) => {
                if self.replace_local(&transaction) {
                    self.accounts.refresh().await;
                } else {
                    self.refresh_page().await;
                }
                Ok(transaction)
            }
            Err(err) => {
                self.refresh().await;
                Err(err)
            }
        }
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        match self
            .transport
            .send(RequestSpec::get(format!("service/transactions/delete/{id}")))
            .await
        {
            Ok(_) => {
                self.refresh_page().await;
                Ok(())
            }
            Err(err) => {
                self.refresh().await;
                Err(err)
            }
        }
    }
}
