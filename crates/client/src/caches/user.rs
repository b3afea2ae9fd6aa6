use std::sync::{Arc, Mutex};

use api_types::user::User;

use crate::{
    error::Result, hooks::RefreshHooks, session::AuthSession, transport::Transport, util,
};

/// Read model of the current user profile.
#[derive(Clone)]
pub struct UserCache {
    session: AuthSession,
    transport: Transport,
    state: Arc<Mutex<Option<User>>>,
}

impl UserCache {
    pub(crate) fn new(session: AuthSession, transport: Transport, hooks: &RefreshHooks) -> Self {
        let cache = Self {
            session,
            transport,
            state: Arc::new(Mutex::new(None)),
        };
        let hook = cache.clone();
        hooks.register_user(move || {
            let cache = hook.clone();
            async move { cache.refresh().await }
        });
        cache
    }

    pub fn current(&self) -> Option<User> {
        util::lock(&self.state).clone()
    }

    pub async fn refresh(&self) {
        if !self.session.authorized() {
            *util::lock(&self.state) = None;
            return;
        }
        match self.transport.get_json::<User>("service/user").await {
            Ok(user) => *util::lock(&self.state) = Some(user),
            Err(err) => tracing::debug!("user refresh failed: {err}"),
        }
    }

    /// Writes the profile; the server response is the canonical new state.
    pub async fn submit(&self, user: &User) -> Result<User> {
        match self.transport.post_json::<_, User>("service/user", user).await {
            Ok(user) => {
                *util::lock(&self.state) = Some(user.clone());
                Ok(user)
            }
            Err(err) => {
                self.refresh().await;
                Err(err)
            }
        }
    }
}
