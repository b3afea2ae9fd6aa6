use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use api_types::auth::TokenResponse;
use reqwest::{Method, StatusCode, Url, multipart};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::{
    alert::AlertSink,
    error::{ClientError, Result},
    hooks::RefreshHooks,
    session::AuthSession,
};

const TOKEN_PATH: &str = "oauth/token";

/// Request body shapes the transport knows how to issue.
///
/// Every variant is rebuilt from owned data on each attempt, which is what
/// makes the recovery replay possible for any request, multipart included.
#[derive(Clone, Debug)]
pub enum Body {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
    File {
        field: String,
        file_name: String,
        bytes: Vec<u8>,
    },
}

/// A replayable description of one request.
#[derive(Clone, Debug)]
pub struct RequestSpec {
    method: Method,
    path: String,
    headers: Vec<(String, String)>,
    body: Body,
}

impl RequestSpec {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    pub fn post(path: impl Into<String>, body: Body) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn is_token_request(&self) -> bool {
        self.path == TOKEN_PATH
    }
}

struct PendingGuard<'a> {
    pending: &'a AtomicUsize,
}

impl<'a> PendingGuard<'a> {
    fn enter(pending: &'a AtomicUsize) -> Self {
        pending.fetch_add(1, Ordering::SeqCst);
        Self { pending }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP front door of the synchronization layer.
///
/// Every request runs under the pending-request counter and the shared
/// failure policy: a 401 on a regular endpoint goes through recovery
/// (re-authenticate, replay once), any other failure raises an alert and
/// triggers one full resynchronization pass.
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: Url,
    client_id: String,
    session: AuthSession,
    alerts: AlertSink,
    hooks: RefreshHooks,
    pending: Arc<AtomicUsize>,
    resyncing: Arc<AtomicBool>,
    recovery: Arc<Mutex<()>>,
}

impl Transport {
    pub(crate) fn new(
        base_url: Url,
        client_id: String,
        session: AuthSession,
        alerts: AlertSink,
        hooks: RefreshHooks,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            client_id,
            session,
            alerts,
            hooks,
            pending: Arc::new(AtomicUsize::new(0)),
            resyncing: Arc::new(AtomicBool::new(false)),
            recovery: Arc::new(Mutex::new(())),
        }
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.pending_requests() > 0
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self.send(RequestSpec::get(path)).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let spec = RequestSpec::post(path, Body::Json(serde_json::to_value(body)?));
        let value = self.send(spec).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn post_file(
        &self,
        path: &str,
        field: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Value> {
        let spec = RequestSpec::post(
            path,
            Body::File {
                field: field.to_string(),
                file_name: file_name.to_string(),
                bytes,
            },
        );
        self.send(spec).await
    }

    /// Issues a request with the full failure policy applied.
    pub async fn send(&self, spec: RequestSpec) -> Result<Value> {
        match self.dispatch(&spec).await {
            Ok(value) => Ok(value),
            Err(err @ ClientError::Authentication(_)) => self.recover(spec, err).await,
            // Token-exchange outcomes belong to the authenticate caller.
            Err(err @ ClientError::AuthExchange(_)) => Err(err),
            Err(err) => {
                self.fail(&err).await;
                Err(err)
            }
        }
    }

    /// Password-grant exchange. Issued outside the recovery path: a rejected
    /// exchange is final, never retried or intercepted.
    pub(crate) async fn token_exchange(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse> {
        let form = vec![
            ("grant_type".to_string(), "password".to_string()),
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
            ("client_id".to_string(), self.client_id.clone()),
        ];
        let value = self
            .dispatch(&RequestSpec::post(TOKEN_PATH, Body::Form(form)))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// One attempt on the wire: counter, headers, status classification.
    /// No recovery, no alerts; policy lives in the callers.
    async fn dispatch(&self, spec: &RequestSpec) -> Result<Value> {
        let _pending = PendingGuard::enter(&self.pending);

        let url = self
            .base_url
            .join(&spec.path)
            .map_err(|err| ClientError::InvalidUrl(format!("{}: {err}", spec.path)))?;

        let mut request = self.http.request(spec.method.clone(), url);
        request = match &spec.body {
            Body::Empty => request,
            Body::Json(value) => request.json(value),
            Body::Form(fields) => request.form(fields),
            Body::File {
                field,
                file_name,
                bytes,
            } => {
                let part = multipart::Part::bytes(bytes.clone()).file_name(file_name.clone());
                request.multipart(multipart::Form::new().part(field.clone(), part))
            }
        };
        for (name, value) in &spec.headers {
            request = request.header(name, value);
        }
        // The session token is applied after caller headers so a stale
        // caller-set Authorization can never shadow it. The token endpoint
        // gets caller headers verbatim.
        if !spec.is_token_request() {
            if let Some(token) = self.session.token() {
                request = request.bearer_auth(token);
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) if spec.is_token_request() => {
                return Err(ClientError::AuthExchange(err.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let status = response.status();
        if status.is_success() {
            let text = response.text().await?;
            if text.is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }

        let message = match response.text().await {
            Ok(text) if !text.is_empty() => match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => body.error,
                Err(_) => text,
            },
            _ => "server error".to_string(),
        };

        Err(if spec.is_token_request() {
            ClientError::AuthExchange(message)
        } else if status == StatusCode::UNAUTHORIZED {
            ClientError::Authentication(message)
        } else {
            ClientError::Server { status, message }
        })
    }

    /// Shared non-401 failure path: alert, then resynchronize, since local
    /// state may have drifted from whatever the failed call left behind.
    async fn fail(&self, err: &ClientError) {
        self.alerts.add(format!("HTTP error: {err}"));
        self.resync().await;
    }

    /// One full resynchronization pass. Failures inside the pass would
    /// otherwise request another pass; the flag suppresses the nesting so a
    /// persistently failing server produces bounded work.
    async fn resync(&self) {
        if self.resyncing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.hooks.update_all_data().await;
        self.resyncing.store(false, Ordering::SeqCst);
    }

    /// Drives one failed request through re-authentication and a single
    /// replay: `Failed401 → Recovering → {Replayed, GaveUp}`.
    ///
    /// Recoveries serialize on one lock, and a recovery that finds the token
    /// already changed under it skips the exchange entirely — two requests
    /// failing together cost one token exchange. The replay runs outside the
    /// lock through the normal failure path, except that a second 401
    /// propagates to the caller instead of being intercepted again.
    async fn recover(&self, spec: RequestSpec, original: ClientError) -> Result<Value> {
        let failed_token = self.session.token();
        {
            let _exchange = self.recovery.lock().await;
            if self.session.token() == failed_token {
                match self.session.credentials() {
                    Some((username, password)) => {
                        if let Err(err) =
                            self.session.authenticate(self, &username, &password).await
                        {
                            tracing::error!("re-authentication failed: {err}");
                            self.session.clear(Some("Unable to authenticate")).await;
                            return Err(original);
                        }
                        tracing::info!("authorization recovered, replaying request");
                    }
                    None => {
                        // A restored token with no credentials behind it
                        // cannot be renewed silently.
                        let reason = self
                            .session
                            .token()
                            .is_some()
                            .then_some("Access token rejected");
                        self.session.clear(reason).await;
                        return Err(original);
                    }
                }
            }
        }

        match self.dispatch(&spec).await {
            Ok(value) => {
                self.hooks.update_all_data().await;
                Ok(value)
            }
            Err(err @ ClientError::Authentication(_)) => Err(err),
            Err(err) => {
                self.fail(&err).await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_requests_are_recognized() {
        assert!(RequestSpec::post(TOKEN_PATH, Body::Empty).is_token_request());
        assert!(!RequestSpec::get("service/user").is_token_request());
        assert!(!RequestSpec::get("service/transactions/pages").is_token_request());
    }
}
