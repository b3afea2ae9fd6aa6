use std::sync::{Arc, Mutex};

use api_types::configuration::ConfigurationVariable;

use crate::{
    error::Result,
    hooks::RefreshHooks,
    session::AuthSession,
    transport::{Body, RequestSpec, Transport},
    util,
};

/// Read model of the admin settings, a flat list of name/value pairs.
#[derive(Clone)]
pub struct ConfigurationCache {
    session: AuthSession,
    transport: Transport,
    state: Arc<Mutex<Vec<ConfigurationVariable>>>,
}

impl ConfigurationCache {
    pub(crate) fn new(session: AuthSession, transport: Transport, hooks: &RefreshHooks) -> Self {
        let cache = Self {
            session,
            transport,
            state: Arc::new(Mutex::new(Vec::new())),
        };
        let hook = cache.clone();
        hooks.register_configuration(move || {
            let cache = hook.clone();
            async move { cache.refresh().await }
        });
        cache
    }

    pub fn variables(&self) -> Vec<ConfigurationVariable> {
        util::lock(&self.state).clone()
    }

    pub fn value(&self, name: &str) -> Option<String> {
        util::lock(&self.state)
            .iter()
            .find(|variable| variable.name == name)
            .map(|variable| variable.value.clone())
    }

    pub async fn refresh(&self) {
        if !self.session.authorized() {
            util::lock(&self.state).clear();
            return;
        }
        match self
            .transport
            .get_json::<Vec<ConfigurationVariable>>("service/configuration")
            .await
        {
            Ok(variables) => *util::lock(&self.state) = variables,
            Err(err) => tracing::debug!("configuration refresh failed: {err}"),
        }
    }

    /// Writes the settings, then refetches whatever the server kept; the
    /// local snapshot follows the server on success and failure alike.
    pub async fn submit(&self, variables: &[ConfigurationVariable]) -> Result<()> {
        let spec = RequestSpec::post(
            "service/configuration",
            Body::Json(serde_json::to_value(variables)?),
        );
        let result = self.transport.send(spec).await;
        self.refresh().await;
        result.map(|_| ())
    }
}
