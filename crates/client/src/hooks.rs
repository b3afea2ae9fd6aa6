//! Late-bound refresh registry.
//!
//! The transport must refresh the caches after recoveries and failures, and
//! the caches issue requests through the transport. The registry breaks that
//! cycle: each cache registers its own refresh under a named slot at
//! construction time, and the transport only ever talks to the slots.
//!
//! Invoking a slot before its cache has registered indicates a wrong
//! construction order and panics; it is a programmer error, never surfaced
//! as an alert. [`crate::ClientBuilder::build`] registers every slot before
//! returning, so a built client cannot hit it.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, OnceLock},
};

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type RefreshFn = Box<dyn Fn() -> BoxFuture + Send + Sync>;

#[derive(Default)]
struct HookTable {
    user: OnceLock<RefreshFn>,
    accounts: OnceLock<RefreshFn>,
    currencies: OnceLock<RefreshFn>,
    transactions: OnceLock<RefreshFn>,
    configuration: OnceLock<RefreshFn>,
}

#[derive(Clone, Default)]
pub struct RefreshHooks {
    table: Arc<HookTable>,
}

impl RefreshHooks {
    fn register<F, Fut>(slot: &OnceLock<RefreshFn>, name: &str, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: RefreshFn = Box::new(move || Box::pin(hook()));
        if slot.set(hook).is_err() {
            panic!("refresh hook `{name}` registered twice");
        }
    }

    async fn invoke(slot: &OnceLock<RefreshFn>, name: &str) {
        let Some(hook) = slot.get() else {
            panic!("refresh hook `{name}` invoked before its cache registered");
        };
        hook().await;
    }

    pub(crate) fn register_user<F, Fut>(&self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::register(&self.table.user, "user", hook);
    }

    pub(crate) fn register_accounts<F, Fut>(&self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::register(&self.table.accounts, "accounts", hook);
    }

    pub(crate) fn register_currencies<F, Fut>(&self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::register(&self.table.currencies, "currencies", hook);
    }

    pub(crate) fn register_transactions<F, Fut>(&self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::register(&self.table.transactions, "transactions", hook);
    }

    pub(crate) fn register_configuration<F, Fut>(&self, hook: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::register(&self.table.configuration, "configuration", hook);
    }

    pub async fn update_user(&self) {
        Self::invoke(&self.table.user, "user").await;
    }

    pub async fn update_accounts(&self) {
        Self::invoke(&self.table.accounts, "accounts").await;
    }

    pub async fn update_currencies(&self) {
        Self::invoke(&self.table.currencies, "currencies").await;
    }

    pub async fn update_transactions(&self) {
        Self::invoke(&self.table.transactions, "transactions").await;
    }

    pub async fn update_configuration(&self) {
        Self::invoke(&self.table.configuration, "configuration").await;
    }

    /// The full resynchronization pass run after recoveries and failures.
    pub async fn update_all_data(&self) {
        self.update_user().await;
        self.update_accounts().await;
    }

    /// Fans out to every cache; driven by AuthState transitions so caches
    /// empty out on logout and repopulate on login. Currencies come before
    /// accounts: account totals resolve currency display names.
    pub(crate) async fn refresh_after_auth_change(&self) {
        self.update_user().await;
        self.update_currencies().await;
        self.update_accounts().await;
        self.update_transactions().await;
        self.update_configuration().await;
    }
}
