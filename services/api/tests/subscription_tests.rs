mod common;

use api_lib::jobs::run_expiry_sweep;
use chrono::{Duration, Utc};
use common::{academy_code, error_code, spawn_test_server, Account, TestApp};
use futures::future::join_all;
use reqwest::StatusCode;
use serde_json::{json, Value};
use sigmora_core::domain::{NewSubscription, PaymentConfirmation, PaymentMeta};
use sigmora_core::ports::SubscriptionLedger;
use uuid::Uuid;

struct Academy {
    creator: Account,
    subscriber: Account,
    package: String,
}

async fn academy(app: &TestApp) -> Academy {
    let creator = app.register_creator("Mia", "mia@sigmora.io").await;
    let subscriber = app
        .register_subscriber("member@mail.io", &academy_code(&creator))
        .await;
    let package = app.create_package(&creator, "Gold").await;
    Academy {
        creator,
        subscriber,
        package,
    }
}

fn ids(list: Value) -> Vec<String> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn webhook_replay_creates_one_subscription() {
    let app = spawn_test_server().await;
    let a = academy(&app).await;
    app.payments
        .succeed("9001", "sigmora_1_x", &a.subscriber.id, &a.package, &a.creator.id);

    let resp = app
        .post("/api/payments/verify", None, json!({ "transaction_id": 9001 }))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let first: Value = resp.json().await.unwrap();
    assert_eq!(first["created"], true);

    let resp = app
        .post(
            "/api/payments/verify",
            None,
            json!({ "tx_ref": "sigmora_1_x", "transaction_id": "9001" }),
        )
        .await;
    let second: Value = resp.json().await.unwrap();
    assert_eq!(second["created"], false);
    assert_eq!(second["message"], "Payment already processed");
    assert_eq!(second["subscription"]["id"], first["subscription"]["id"]);

    let resp = app.get("/api/subscriptions", Some(&a.subscriber.token)).await;
    let rows: Value = resp.json().await.unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["paymentReference"], "sigmora_1_x");
}

#[tokio::test]
async fn concurrent_verifications_agree_on_one_row() {
    let app = spawn_test_server().await;
    let a = academy(&app).await;
    app.payments
        .succeed("777", "sigmora_2_y", &a.subscriber.id, &a.package, &a.creator.id);

    let calls = (0..8).map(|_| {
        app.post("/api/payments/verify", None, json!({ "transaction_id": 777 }))
    });
    let responses = join_all(calls).await;

    let mut created = 0;
    let mut subscription_ids = Vec::new();
    for resp in responses {
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = resp.json().await.unwrap();
        if body["created"] == true {
            created += 1;
        }
        subscription_ids.push(body["subscription"]["id"].clone());
    }
    assert_eq!(created, 1);
    subscription_ids.dedup();
    assert_eq!(subscription_ids.len(), 1);

    let rows = app.store.list_for_subscriber(a.subscriber.id.parse().unwrap()).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn failed_or_malformed_payments_create_nothing() {
    let app = spawn_test_server().await;
    let a = academy(&app).await;

    app.payments.script(
        "1",
        PaymentConfirmation {
            status: "failed".into(),
            tx_ref: "sigmora_3_z".into(),
            amount: 5000.0,
            meta: PaymentMeta::default(),
        },
    );
    app.payments.script(
        "2",
        PaymentConfirmation {
            status: "successful".into(),
            tx_ref: "sigmora_4_z".into(),
            amount: 5000.0,
            meta: PaymentMeta {
                subscriber_id: Some(a.subscriber.id.clone()),
                package_id: Some("not-a-uuid".into()),
                creator_id: Some(a.creator.id.clone()),
            },
        },
    );

    let resp = app.post("/api/payments/verify", None, json!({ "transaction_id": 1 })).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(resp).await, "PAYMENT_NOT_SUCCESSFUL");

    let resp = app.post("/api/payments/verify", None, json!({ "transaction_id": 2 })).await;
    assert_eq!(error_code(resp).await, "INVALID_PAYMENT_METADATA");

    // Unknown to the provider: an upstream failure.
    let resp = app.post("/api/payments/verify", None, json!({ "transaction_id": 3 })).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(resp).await, "PAYMENT_PROVIDER_ERROR");

    let resp = app.post("/api/payments/verify", None, json!({})).await;
    assert_eq!(error_code(resp).await, "VALIDATION_FAILED");

    let resp = app.get("/api/subscriptions/status", Some(&a.subscriber.token)).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["hasActive"], false);
    assert_eq!(body["activeCount"], 0);
}

#[tokio::test]
async fn payment_for_unknown_users_is_a_client_error() {
    let app = spawn_test_server().await;
    let a = academy(&app).await;
    let ghost = Uuid::new_v4().to_string();
    app.payments
        .succeed("404", "sigmora_6_g", &ghost, &a.package, &a.creator.id);

    // Well-formed ids naming nobody: 400, so the provider stops retrying.
    for _ in 0..2 {
        let resp = app
            .post("/api/payments/verify", None, json!({ "transaction_id": "404" }))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_code(resp).await, "INVALID_PAYMENT_METADATA");
    }

    let resp = app.get("/api/subscriptions/creator", Some(&a.creator.token)).await;
    let body: Value = resp.json().await.unwrap();
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn callback_activates_and_redirects() {
    let app = spawn_test_server().await;
    let a = academy(&app).await;
    app.payments
        .succeed("55", "sigmora_5_w", &a.subscriber.id, &a.package, &a.creator.id);

    let resp = app
        .get(
            "/api/payments/callback?status=successful&tx_ref=sigmora_5_w&transaction_id=55",
            None,
        )
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        resp.headers()["location"],
        "http://frontend.test/payment/callback?status=successful&tx_ref=sigmora_5_w"
    );

    let resp = app
        .get(
            "/api/payments/callback?status=successful&tx_ref=sigmora_6_w&transaction_id=404",
            None,
        )
        .await;
    assert_eq!(
        resp.headers()["location"],
        "http://frontend.test/payment/callback?status=failed&tx_ref=sigmora_6_w"
    );

    let resp = app.get("/api/subscriptions/status", Some(&a.subscriber.token)).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["activeCount"], 1);
}

#[tokio::test]
async fn initialize_payment_stays_inside_the_academy() {
    let app = spawn_test_server().await;
    let a = academy(&app).await;
    let stranger = app.register_creator("Ned", "ned@sigmora.io").await;
    let foreign_package = app.create_package(&stranger, "Elsewhere").await;

    let resp = app
        .post(
            "/api/payments/initialize",
            Some(&a.subscriber.token),
            json!({ "packageId": a.package }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    let tx_ref = body["txRef"].as_str().unwrap();
    assert!(tx_ref.starts_with("sigmora_"));
    assert!(tx_ref.ends_with(&a.subscriber.id));
    assert!(body["paymentLink"].as_str().unwrap().contains(tx_ref));

    let sent = app.payments.initialized();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, "Sigmora - Gold");
    assert_eq!(sent[0].redirect_url, "http://frontend.test/payment/callback");
    assert_eq!(sent[0].currency, "NGN");

    let resp = app
        .post(
            "/api/payments/initialize",
            Some(&a.subscriber.token),
            json!({ "packageId": foreign_package }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(resp).await, "NOT_OWNER");

    let resp = app
        .post(
            "/api/payments/initialize",
            Some(&a.subscriber.token),
            json!({ "packageId": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn trade_feeds_follow_the_ledger() {
    let app = spawn_test_server().await;
    let a = academy(&app).await;
    let other_package = app.create_package(&a.creator, "Silver").await;
    let asset = app.create_asset(&a.creator, "EURUSD").await;
    let gold_trade = app.create_trade(&a.creator, &asset, &[&a.package]).await;
    let silver_trade = app.create_trade(&a.creator, &asset, &[&other_package]).await;
    let token = a.subscriber.token.as_str();

    // No subscription: empty feeds and no single-trade access.
    let resp = app.get("/api/trades/subscriber/active", Some(token)).await;
    assert_eq!(ids(resp.json().await.unwrap()), Vec::<String>::new());
    let resp = app.get(&format!("/api/trades/{gold_trade}"), Some(token)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(resp).await, "NOT_SUBSCRIBED");

    // Subscribe to Gold, activated 31 days ago so the sweeper will expire it.
    let subscriber_id: Uuid = a.subscriber.id.parse().unwrap();
    let activation = app
        .store
        .activate(
            NewSubscription {
                subscriber_id,
                creator_id: a.creator.id.parse().unwrap(),
                package_id: a.package.parse().unwrap(),
                payment_reference: "sigmora_old".into(),
                amount_paid: 5000.0,
            },
            Utc::now() - Duration::days(31),
        )
        .await
        .unwrap();
    assert!(activation.created);

    let resp = app.get("/api/trades/subscriber/active", Some(token)).await;
    assert_eq!(ids(resp.json().await.unwrap()), vec![gold_trade.clone()]);
    let resp = app.get(&format!("/api/trades/{silver_trade}"), Some(token)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // Close the Gold trade: it moves to the history feed.
    let resp = app
        .put(
            &format!("/api/trades/{gold_trade}/close"),
            &a.creator.token,
            json!({ "reason": "SL" }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app.get("/api/trades/subscriber/completed", Some(token)).await;
    assert_eq!(ids(resp.json().await.unwrap()), vec![gold_trade.clone()]);

    // The stored status is authoritative until the sweep runs.
    let resp = app.get("/api/subscriptions/status", Some(token)).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["hasActive"], true);

    let expired = run_expiry_sweep(app.store.as_ref(), Utc::now()).await.unwrap();
    assert_eq!(expired, 1);
    assert_eq!(run_expiry_sweep(app.store.as_ref(), Utc::now()).await.unwrap(), 0);

    let resp = app.get("/api/subscriptions/status", Some(token)).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["hasActive"], false);
    assert!(body["nearestExpiry"].is_null());

    // Expired rows still open the history, never the live feed.
    let resp = app.get("/api/trades/subscriber/completed", Some(token)).await;
    assert_eq!(ids(resp.json().await.unwrap()), vec![gold_trade.clone()]);
    let resp = app.get(&format!("/api/trades/{gold_trade}"), Some(token)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app.get("/api/trades/subscriber/active", Some(token)).await;
    assert_eq!(ids(resp.json().await.unwrap()), Vec::<String>::new());
}

#[tokio::test]
async fn creators_see_who_subscribed() {
    let app = spawn_test_server().await;
    let a = academy(&app).await;
    app.payments
        .succeed("31", "sigmora_7_v", &a.subscriber.id, &a.package, &a.creator.id);
    app.post("/api/payments/verify", None, json!({ "transaction_id": 31 }))
        .await;

    let resp = app.get("/api/subscriptions/creator", Some(&a.creator.token)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let rows: Value = resp.json().await.unwrap();
    assert_eq!(rows[0]["subscriberId"], a.subscriber.id.as_str());

    let resp = app.get("/api/subscriptions/creator", Some(&a.subscriber.token)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let resp = app.get("/api/subscriptions/status", Some(&a.creator.token)).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
