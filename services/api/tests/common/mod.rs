#![allow(dead_code)]

use api_lib::{
    adapters::InMemoryStore,
    config::Config,
    web::{build_router, state::AppState},
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use sigmora_core::domain::{PaymentConfirmation, PaymentMeta, PaymentRequest};
use sigmora_core::ports::{PaymentProvider, PortError, PortResult};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// A payment provider that answers from a script instead of the network.
#[derive(Default)]
pub struct FakePayments {
    confirmations: Mutex<HashMap<String, PaymentConfirmation>>,
    initialized: Mutex<Vec<PaymentRequest>>,
}

impl FakePayments {
    /// Makes `transaction_id` verify as a successful payment for the given ids.
    pub fn succeed(&self, transaction_id: &str, tx_ref: &str, subscriber: &str, package: &str, creator: &str) {
        self.script(
            transaction_id,
            PaymentConfirmation {
                status: "successful".into(),
                tx_ref: tx_ref.into(),
                amount: 5000.0,
                meta: PaymentMeta {
                    subscriber_id: Some(subscriber.into()),
                    package_id: Some(package.into()),
                    creator_id: Some(creator.into()),
                },
            },
        );
    }

    pub fn script(&self, transaction_id: &str, confirmation: PaymentConfirmation) {
        self.confirmations
            .lock()
            .unwrap()
            .insert(transaction_id.to_string(), confirmation);
    }

    pub fn initialized(&self) -> Vec<PaymentRequest> {
        self.initialized.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProvider for FakePayments {
    async fn initialize_payment(&self, request: &PaymentRequest) -> PortResult<String> {
        self.initialized.lock().unwrap().push(request.clone());
        Ok(format!("https://checkout.test/pay/{}", request.tx_ref))
    }

    async fn verify_transaction(&self, transaction_id: &str) -> PortResult<PaymentConfirmation> {
        self.confirmations
            .lock()
            .unwrap()
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| PortError::Unexpected(format!("unknown transaction {transaction_id}")))
    }
}

pub struct TestApp {
    pub base: String,
    pub client: Client,
    pub store: Arc<InMemoryStore>,
    pub payments: Arc<FakePayments>,
}

pub const JWT_SECRET: &str = "integration-test-secret";

/// Spin up the HTTP server on an OS-assigned port backed by in-memory storage.
pub async fn spawn_test_server() -> TestApp {
    spawn_test_server_with(|_, _| {}).await
}

/// Like `spawn_test_server`, but lets the caller rewire ports of the state
/// before the router is built.
pub async fn spawn_test_server_with(
    customize: impl FnOnce(&mut AppState, &Arc<InMemoryStore>),
) -> TestApp {
    let config = Config::from_vars(|name| match name {
        "JWT_SECRET" => Some(JWT_SECRET.to_string()),
        "DATABASE_URL" => Some("postgres://unused".to_string()),
        "FRONTEND_URL" => Some("http://frontend.test".to_string()),
        _ => None,
    })
    .unwrap();

    let store = Arc::new(InMemoryStore::new());
    let payments = Arc::new(FakePayments::default());
    let mut state = AppState::new(store.clone(), payments.clone(), Arc::new(config));
    customize(&mut state, &store);
    let app = build_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestApp {
        base: format!("http://127.0.0.1:{}", port),
        client,
        store,
        payments,
    }
}

/// A registered account as seen by the client.
pub struct Account {
    pub id: String,
    pub token: String,
    pub body: Value,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Response {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap()
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> Response {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap()
    }

    pub async fn put(&self, path: &str, token: &str, body: Value) -> Response {
        self.client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, path: &str, token: &str) -> Response {
        self.client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    pub async fn register_creator(&self, name: &str, email: &str) -> Account {
        let resp = self
            .post(
                "/api/auth/register/creator",
                None,
                json!({ "name": name, "email": email, "password": "secret123", "creatorName": name }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        account(resp.json().await.unwrap())
    }

    pub async fn register_subscriber(&self, email: &str, academy_code: &str) -> Account {
        let resp = self
            .post(
                "/api/auth/register/subscriber",
                None,
                json!({ "email": email, "password": "secret123", "academyCode": academy_code }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        account(resp.json().await.unwrap())
    }

    pub async fn create_package(&self, creator: &Account, name: &str) -> String {
        let resp = self
            .post(
                "/api/packages",
                Some(&creator.token),
                json!({ "name": name, "description": "Signals", "price": 5000, "features": ["Daily"] }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = resp.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn create_asset(&self, creator: &Account, symbol: &str) -> String {
        let resp = self
            .post(
                "/api/assets",
                Some(&creator.token),
                json!({ "symbol": symbol, "pipValue": 10, "spread": 1.5, "margin": 100 }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = resp.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }

    pub async fn create_trade(&self, creator: &Account, asset: &str, packages: &[&str]) -> String {
        let resp = self
            .post(
                "/api/trades",
                Some(&creator.token),
                json!({
                    "asset": asset,
                    "type": "BUY",
                    "pip": 30,
                    "spread": 1.2,
                    "takeProfit": 1.0950,
                    "stopLoss": 1.0810,
                    "packages": packages,
                }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = resp.json().await.unwrap();
        body["id"].as_str().unwrap().to_string()
    }
}

fn account(body: Value) -> Account {
    Account {
        id: body["user"]["id"].as_str().unwrap().to_string(),
        token: body["token"].as_str().unwrap().to_string(),
        body,
    }
}

/// Reads the `code` field of an error response.
pub async fn error_code(resp: Response) -> String {
    let body: Value = resp.json().await.unwrap();
    body["code"].as_str().unwrap_or_default().to_string()
}

pub fn academy_code(creator: &Account) -> String {
    creator.body["user"]["academyCode"]
        .as_str()
        .unwrap()
        .to_string()
}
