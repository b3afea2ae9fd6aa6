use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    extract::{Form, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use chrono::NaiveDate;
use serde_json::{Value, json};

use api_types::{
    account::Account,
    transaction::{Component, Transaction, TransactionType},
};
use client::{Client, ClientError};

#[derive(Default)]
struct StubState {
    valid_token: Option<String>,
    reject_all: bool,
    fail_user: bool,
    token_requests: usize,
    user_fetches: usize,
    account_fetches: usize,
    page_fetches: Vec<u32>,
    submissions: usize,
    total_pages: u32,
    accounts: Vec<Account>,
    page: Vec<Transaction>,
    extra: Vec<Transaction>,
}

type Shared = Arc<Mutex<StubState>>;

type Reply = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "token expired"})),
    )
}

fn authorize(state: &StubState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let presented = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok());
    let expected = state
        .valid_token
        .as_ref()
        .map(|token| format!("Bearer {token}"));
    match (presented, expected) {
        (Some(presented), Some(expected)) if presented == expected && !state.reject_all => Ok(()),
        _ => Err(unauthorized()),
    }
}

async fn token(State(state): State<Shared>, Form(form): Form<HashMap<String, String>>) -> Reply {
    let mut state = state.lock().unwrap();
    state.token_requests += 1;
    let ok = form.get("grant_type").map(String::as_str) == Some("password")
        && form.get("username").map(String::as_str) == Some("alice")
        && form.get("password").map(String::as_str) == Some("secret")
        && form.contains_key("client_id");
    if !ok {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "bad credentials"})),
        ));
    }
    let token = format!("tok-{}", state.token_requests);
    state.valid_token = Some(token.clone());
    Ok(Json(json!({"access_token": token, "token_type": "bearer"})))
}

async fn get_user(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let mut state = state.lock().unwrap();
    authorize(&state, &headers)?;
    if state.fail_user {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "boom"})),
        ));
    }
    state.user_fetches += 1;
    Ok(Json(json!({"username": "alice", "version": 1})))
}

async fn post_user(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(user): Json<Value>,
) -> Reply {
    let state = state.lock().unwrap();
    authorize(&state, &headers)?;
    let mut user = user;
    if let Some(fields) = user.as_object_mut() {
        fields.remove("password");
    }
    Ok(Json(user))
}

async fn get_accounts(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let mut state = state.lock().unwrap();
    authorize(&state, &headers)?;
    state.account_fetches += 1;
    Ok(Json(serde_json::to_value(&state.accounts).unwrap()))
}

async fn post_accounts(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(mut accounts): Json<Vec<Account>>,
) -> Reply {
    let mut state = state.lock().unwrap();
    authorize(&state, &headers)?;
    for (index, account) in accounts.iter_mut().enumerate() {
        if account.id.is_none() {
            account.id = Some(1000 + index as i64);
        }
        account.version = Some(account.version.unwrap_or(0) + 1);
    }
    state.accounts = accounts;
    Ok(Json(serde_json::to_value(&state.accounts).unwrap()))
}

async fn get_currencies(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let state = state.lock().unwrap();
    authorize(&state, &headers)?;
    Ok(Json(json!([
        {"code": "USD", "displayName": "US Dollar"},
        {"code": "EUR", "displayName": "Euro"},
    ])))
}

async fn get_configuration(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let state = state.lock().unwrap();
    authorize(&state, &headers)?;
    Ok(Json(json!([{"name": "AllowRegistration", "value": "true"}])))
}

async fn post_configuration(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(variables): Json<Value>,
) -> Reply {
    let state = state.lock().unwrap();
    authorize(&state, &headers)?;
    Ok(Json(variables))
}

async fn get_pages(State(state): State<Shared>, headers: HeaderMap) -> Reply {
    let state = state.lock().unwrap();
    authorize(&state, &headers)?;
    Ok(Json(json!(state.total_pages)))
}

async fn get_tx_item(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(item): Path<String>,
) -> Reply {
    let mut state = state.lock().unwrap();
    authorize(&state, &headers)?;

    if let Some(page) = item.strip_prefix("page_") {
        let page: u32 = page
            .parse()
            .map_err(|_| (StatusCode::NOT_FOUND, Json(json!({"error": "no such page"}))))?;
        state.page_fetches.push(page);
        return Ok(Json(serde_json::to_value(&state.page).unwrap()));
    }

    let id: i64 = item
        .parse()
        .map_err(|_| (StatusCode::NOT_FOUND, Json(json!({"error": "no such transaction"}))))?;
    state
        .page
        .iter()
        .chain(state.extra.iter())
        .find(|tx| tx.id == Some(id))
        .map(|tx| Json(serde_json::to_value(tx).unwrap()))
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(json!({"error": "no such transaction"})),
        ))
}

async fn submit_tx(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(mut transaction): Json<Transaction>,
) -> Reply {
    let mut state = state.lock().unwrap();
    authorize(&state, &headers)?;
    state.submissions += 1;
    if transaction.id.is_none() {
        transaction.id = Some(100 + state.submissions as i64);
    }
    transaction.version = Some(transaction.version.unwrap_or(0) + 1);
    Ok(Json(serde_json::to_value(&transaction).unwrap()))
}

async fn delete_tx(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let mut state = state.lock().unwrap();
    authorize(&state, &headers)?;
    state.page.retain(|tx| tx.id != Some(id));
    Ok(StatusCode::OK)
}

async fn import(
    State(state): State<Shared>,
    headers: HeaderMap,
    _body: axum::body::Bytes,
) -> Reply {
    let state = state.lock().unwrap();
    authorize(&state, &headers)?;
    Ok(Json(json!(true)))
}

fn account(id: i64, currency: &str, balance_minor: i64) -> Account {
    Account {
        id: Some(id),
        name: format!("account {id}"),
        currency: currency.to_string(),
        balance_minor,
        include_in_total: true,
        show_in_list: true,
        version: Some(1),
    }
}

fn transaction(id: i64, description: &str, components: Vec<Component>) -> Transaction {
    Transaction {
        id: Some(id),
        version: Some(1),
        description: description.to_string(),
        date: NaiveDate::from_ymd_opt(2016, 1, 15).unwrap(),
        tags: vec!["test".to_string()],
        kind: TransactionType::ExpenseIncome,
        components,
    }
}

fn component(account_id: i64, amount_minor: i64) -> Component {
    Component {
        id: None,
        version: None,
        account_id,
        amount_minor,
    }
}

struct Fixture {
    state: Shared,
    base_url: String,
    dir: tempfile::TempDir,
}

impl Fixture {
    fn client(&self) -> Client {
        Client::builder()
            .base_url(&self.base_url)
            .session_path(self.dir.path().join("session.json"))
            .build()
            .unwrap()
    }
}

async fn fixture() -> Fixture {
    let state = Arc::new(Mutex::new(StubState {
        total_pages: 9,
        accounts: vec![
            account(1, "USD", 10_000),
            account(2, "USD", 5_000),
            account(3, "EUR", 2_500),
        ],
        page: vec![
            transaction(1, "groceries", vec![component(1, -3_199)]),
            transaction(2, "salary", vec![component(1, 250_000)]),
        ],
        extra: vec![transaction(55, "moved elsewhere", vec![component(2, -100)])],
        ..StubState::default()
    }));

    let app = Router::new()
        .route("/oauth/token", post(token))
        .route("/service/user", get(get_user).post(post_user))
        .route("/service/accounts", get(get_accounts).post(post_accounts))
        .route("/service/currencies", get(get_currencies))
        .route(
            "/service/configuration",
            get(get_configuration).post(post_configuration),
        )
        .route("/service/import", post(import))
        .route("/service/transactions/pages", get(get_pages))
        .route("/service/transactions/submit", post(submit_tx))
        .route("/service/transactions/delete/{id}", get(delete_tx))
        .route("/service/transactions/{item}", get(get_tx_item))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Fixture {
        state,
        base_url,
        dir: tempfile::tempdir().unwrap(),
    }
}

#[tokio::test]
async fn login_populates_every_cache() {
    let fx = fixture().await;
    let client = fx.client();
    assert!(!client.session().authorized());

    client.login("alice", "secret").await.unwrap();

    assert!(client.session().authorized());
    assert_eq!(client.user().current().unwrap().username, "alice");
    assert_eq!(client.accounts().accounts().len(), 3);
    assert_eq!(client.currencies().currencies().len(), 2);
    assert_eq!(client.transactions().transactions().len(), 2);
    assert_eq!(client.transactions().page_window().total_pages, 9);
    assert_eq!(
        client.configuration().value("AllowRegistration").as_deref(),
        Some("true")
    );

    let totals = client.accounts().totals_for_currency();
    assert_eq!(totals.get("USD").unwrap().total_minor, 15_000);
    assert_eq!(
        totals.get("USD").unwrap().display_name.as_deref(),
        Some("US Dollar")
    );
    assert_eq!(totals.get("EUR").unwrap().total_minor, 2_500);

    assert_eq!(client.pending_requests(), 0);
    assert!(!client.is_busy());
}

#[tokio::test]
async fn token_survives_a_simulated_restart() {
    let fx = fixture().await;
    let client = fx.client();
    client.login("alice", "secret").await.unwrap();
    let exchanges = fx.state.lock().unwrap().token_requests;

    let restarted = fx.client();
    assert!(restarted.session().authorized());
    // Restore must not talk to the server.
    assert_eq!(fx.state.lock().unwrap().token_requests, exchanges);

    restarted.bootstrap().await;
    assert_eq!(restarted.accounts().accounts().len(), 3);
}

#[tokio::test]
async fn expired_token_is_recovered_with_a_single_replay() {
    let fx = fixture().await;
    let client = fx.client();
    client.login("alice", "secret").await.unwrap();

    fx.state.lock().unwrap().valid_token = Some("expired-under-us".to_string());
    let exchanges = fx.state.lock().unwrap().token_requests;

    // The caller observes plain success.
    let tx = client.transactions().update_one(1).await.unwrap();
    assert_eq!(tx.description, "groceries");

    assert_eq!(fx.state.lock().unwrap().token_requests, exchanges + 1);
    assert!(client.session().authorized());
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn a_second_401_on_the_replay_is_not_recovered_again() {
    let fx = fixture().await;
    let client = fx.client();
    client.login("alice", "secret").await.unwrap();

    fx.state.lock().unwrap().reject_all = true;
    let exchanges = fx.state.lock().unwrap().token_requests;

    let err = client.transactions().update_one(1).await.unwrap_err();
    assert!(matches!(err, ClientError::Authentication(_)));

    // Exactly one re-authentication, then the replay's 401 propagated.
    assert_eq!(fx.state.lock().unwrap().token_requests, exchanges + 1);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn rejected_restored_token_clears_the_session_with_an_alert() {
    let fx = fixture().await;
    {
        let client = fx.client();
        client.login("alice", "secret").await.unwrap();
    }

    fx.state.lock().unwrap().valid_token = Some("rotated-away".to_string());

    // Restored session has a token but no credentials to retry with.
    let client = fx.client();
    assert!(client.session().authorized());
    client.bootstrap().await;

    assert!(!client.session().authorized());
    let alerts = client.alerts().alerts();
    assert!(
        alerts
            .iter()
            .any(|alert| alert.message == "Access token rejected"),
        "alerts: {alerts:?}"
    );
    assert!(client.accounts().accounts().is_empty());
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn logout_empties_every_snapshot() {
    let fx = fixture().await;
    let client = fx.client();
    client.login("alice", "secret").await.unwrap();
    assert!(!client.accounts().totals_for_currency().is_empty());

    client.logout().await;

    assert!(!client.session().authorized());
    assert!(client.user().current().is_none());
    assert!(client.accounts().accounts().is_empty());
    assert!(client.accounts().totals_for_currency().is_empty());
    assert!(client.currencies().currencies().is_empty());
    assert!(client.transactions().transactions().is_empty());
    assert_eq!(
        client.transactions().page_window(),
        client::PageWindow::default()
    );
    assert!(client.configuration().variables().is_empty());

    // The durable token is gone too: a fresh process starts logged out.
    let fresh = fx.client();
    assert!(!fresh.session().authorized());
}

#[tokio::test]
async fn client_pages_are_requested_zero_based() {
    let fx = fixture().await;
    let client = fx.client();
    client.login("alice", "secret").await.unwrap();

    fx.state.lock().unwrap().page_fetches.clear();
    client.transactions().set_page(5).await;
    assert_eq!(client.transactions().page_window().current_page, 5);
    assert_eq!(fx.state.lock().unwrap().page_fetches.first(), Some(&4));

    // Out-of-range pages clamp to the window.
    client.transactions().set_page(42).await;
    assert_eq!(client.transactions().page_window().current_page, 9);
    client.transactions().set_page(1).await;
    assert_eq!(fx.state.lock().unwrap().page_fetches.last(), Some(&0));
}

#[tokio::test]
async fn unbalanced_transfer_never_reaches_the_wire() {
    let fx = fixture().await;
    let client = fx.client();
    client.login("alice", "secret").await.unwrap();

    let mut transfer = transaction(0, "move", vec![component(1, -100), component(2, 90)]);
    transfer.id = None;
    transfer.version = None;
    transfer.kind = TransactionType::Transfer;

    let err = client.transactions().submit(&transfer).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert_eq!(fx.state.lock().unwrap().submissions, 0);

    transfer.components[1].amount_minor = 100;
    client.transactions().submit(&transfer).await.unwrap();
    assert_eq!(fx.state.lock().unwrap().submissions, 1);
}

#[tokio::test]
async fn server_failure_raises_an_alert_and_resynchronizes() {
    let fx = fixture().await;
    let client = fx.client();
    client.login("alice", "secret").await.unwrap();

    fx.state.lock().unwrap().fail_user = true;
    let account_fetches = fx.state.lock().unwrap().account_fetches;

    client.user().refresh().await;

    let alerts = client.alerts().alerts();
    assert!(
        alerts
            .iter()
            .any(|alert| alert.message.contains("500") && alert.message.contains("boom")),
        "alerts: {alerts:?}"
    );
    // The resynchronization pass refetched the accounts.
    assert!(fx.state.lock().unwrap().account_fetches > account_fetches);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn account_submit_installs_the_canonical_set_and_invalidates_transactions() {
    let fx = fixture().await;
    let client = fx.client();
    client.login("alice", "secret").await.unwrap();

    let mut accounts = client.accounts().accounts();
    accounts.push(Account {
        id: None,
        name: "new savings".to_string(),
        currency: "EUR".to_string(),
        balance_minor: 0,
        include_in_total: true,
        show_in_list: true,
        version: None,
    });
    let pages_before = fx.state.lock().unwrap().page_fetches.len();

    let canonical = client.accounts().submit(&accounts).await.unwrap();
    assert!(canonical.iter().all(|account| account.id.is_some()));
    assert_eq!(client.accounts().accounts(), canonical);
    // Balances may have moved: the transactions hook ran.
    assert!(fx.state.lock().unwrap().page_fetches.len() > pages_before);
}

#[tokio::test]
async fn update_one_replaces_in_place_or_falls_back_to_the_page() {
    let fx = fixture().await;
    let client = fx.client();
    client.login("alice", "secret").await.unwrap();

    fx.state.lock().unwrap().page[0].description = "groceries (edited)".to_string();
    let pages_before = fx.state.lock().unwrap().page_fetches.len();

    client.transactions().update_one(1).await.unwrap();
    let local = client.transactions().transactions();
    assert_eq!(local[0].description, "groceries (edited)");
    // In-place replacement, no page refetch.
    assert_eq!(fx.state.lock().unwrap().page_fetches.len(), pages_before);

    // A transaction the server knows but the current page does not triggers
    // the page fallback.
    client.transactions().update_one(55).await.unwrap();
    assert!(fx.state.lock().unwrap().page_fetches.len() > pages_before);
}

#[tokio::test]
async fn user_submit_installs_the_canonical_profile() {
    let fx = fixture().await;
    let client = fx.client();
    client.login("alice", "secret").await.unwrap();

    let mut profile = client.user().current().unwrap();
    profile.password = Some("hunter2".to_string());
    let canonical = client.user().submit(&profile).await.unwrap();

    // The server never echoes the password back.
    assert_eq!(canonical.password, None);
    assert_eq!(client.user().current(), Some(canonical));
}

#[tokio::test]
async fn delete_refetches_the_current_page() {
    let fx = fixture().await;
    let client = fx.client();
    client.login("alice", "secret").await.unwrap();
    assert_eq!(client.transactions().transactions().len(), 2);

    client.transactions().delete(1).await.unwrap();
    let remaining = client.transactions().transactions();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, Some(2));
}

#[tokio::test]
async fn import_triggers_a_full_refresh() {
    let fx = fixture().await;
    let client = fx.client();
    client.login("alice", "secret").await.unwrap();

    let user_fetches = fx.state.lock().unwrap().user_fetches;
    client
        .import_file("backup.xml", b"<export/>".to_vec())
        .await
        .unwrap();
    assert!(fx.state.lock().unwrap().user_fetches > user_fetches);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn overlapping_requests_settle_the_pending_counter_at_zero() {
    let fx = fixture().await;
    let client = fx.client();
    client.login("alice", "secret").await.unwrap();

    fx.state.lock().unwrap().fail_user = true;
    tokio::join!(
        client.user().refresh(),
        client.accounts().refresh(),
        client.transactions().refresh(),
        client.currencies().refresh(),
    );

    assert_eq!(client.pending_requests(), 0);
    assert!(!client.is_busy());
}
