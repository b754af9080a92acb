use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use skybook_api::{app, auth::issue_token, metrics::Metrics, AppState, AuthConfig, Resiliency};
use skybook_core::payment::{TOKEN_AMBIGUOUS, TOKEN_DECLINE};
use skybook_core::{EventSink, Flight, ManualClock, MockPaymentGateway, StaticCatalog};
use skybook_inventory::MemorySeatInventory;
use skybook_ledger::{MemoryBookingStore, ReservationLedger};
use skybook_saga::{SagaCoordinator, SagaPolicy};
use skybook_store::BroadcastEventSink;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    flight: Flight,
    clock: Arc<ManualClock>,
    seat_events: BroadcastEventSink,
}

async fn test_app() -> TestApp {
    test_app_with(MockPaymentGateway::new()).await
}

async fn test_app_with(gateway: MockPaymentGateway) -> TestApp {
    let flight = Flight::new("SB100", 20, 15_000, "USD").with_seats_per_row(1);
    let clock = Arc::new(ManualClock::default());
    let ledger = Arc::new(ReservationLedger::new(
        Arc::new(MemorySeatInventory::new()),
        Arc::new(MemoryBookingStore::new()),
        clock.clone(),
    ));
    let seat_events = BroadcastEventSink::new(64);
    let coordinator = Arc::new(SagaCoordinator::new(
        Arc::new(StaticCatalog::new(vec![flight.clone()])),
        ledger,
        Arc::new(gateway),
        Arc::new(seat_events.clone()) as Arc<dyn EventSink>,
        SagaPolicy::immediate(chrono::Duration::minutes(10)),
    ));
    coordinator.provision_catalog().await.unwrap();

    let state = AppState {
        coordinator,
        seat_events: seat_events.clone(),
        metrics: Arc::new(Metrics::new().unwrap()),
        resiliency: Arc::new(Resiliency::default()),
        auth: AuthConfig { secret: SECRET.to_string(), expiration: 3600 },
    };

    TestApp { router: app(state), flight, clock, seat_events }
}

fn customer(sub: &str) -> String {
    issue_token(SECRET, sub, "CUSTOMER", 3600).unwrap()
}

fn admin() -> String {
    issue_token(SECRET, "ops", "ADMIN", 3600).unwrap()
}

async fn send(router: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn reserve(app: &TestApp, token: &str, seat: &str) -> (StatusCode, Value) {
    send(
        &app.router,
        "POST",
        "/v1/bookings",
        Some(token),
        Some(json!({ "flight_id": app.flight.id, "seat_number": seat })),
    )
    .await
}

fn card(token: &str) -> Value {
    json!({ "method": "CARD", "amount_cents": 15_000, "currency": "USD", "token": token })
}

#[tokio::test]
async fn test_health_is_public() {
    let app = test_app().await;
    let (status, body) = send(&app.router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_guest_login_issues_usable_token() {
    let app = test_app().await;
    let (status, body) = send(&app.router, "POST", "/v1/auth/guest", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let token = body["token"].as_str().unwrap().to_string();
    let (status, _) = reserve(&app, &token, "1A").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_bookings_require_a_token() {
    let app = test_app().await;
    let (status, _) = send(&app.router, "GET", "/v1/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app.router, "GET", "/v1/bookings", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_reserve_then_seat_taken() {
    let app = test_app().await;
    let alice = customer("alice");
    let bob = customer("bob");

    let (status, booking) = reserve(&app, &alice, "12a").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["state"], "HELD");
    assert_eq!(booking["seat_number"], "12A");
    assert!(booking.get("claim_token").is_none());

    let (status, body) = reserve(&app, &bob, "12A").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "SEAT_TAKEN");
    assert_eq!(body["retryable"], true);

    let (status, seats) = send(&app.router, "GET", &format!("/v1/flights/{}/seats", app.flight.id), Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seats.as_array().unwrap().len(), 1);
    assert_eq!(seats[0]["seat_number"], "12A");
}

#[tokio::test]
async fn test_unknown_seat_and_flight() {
    let app = test_app().await;
    let alice = customer("alice");

    let (status, body) = reserve(&app, &alice, "99A").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "SEAT_NOT_FOUND");

    let (status, body) = send(
        &app.router,
        "POST",
        "/v1/bookings",
        Some(&alice),
        Some(json!({ "flight_id": uuid::Uuid::new_v4(), "seat_number": "1A" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "FLIGHT_NOT_FOUND");
}

#[tokio::test]
async fn test_pay_outcomes() {
    let app = test_app().await;
    let alice = customer("alice");
    let (_, booking) = reserve(&app, &alice, "3A").await;
    let id = booking["id"].as_str().unwrap().to_string();
    let pay_uri = format!("/v1/bookings/{}/pay", id);

    let (status, body) = send(&app.router, "POST", &pay_uri, Some(&alice), Some(card(TOKEN_DECLINE))).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["status"], "REJECTED");
    assert_eq!(body["booking"]["state"], "HELD");

    let (status, body) = send(&app.router, "POST", &pay_uri, Some(&alice), Some(card("tok_visa"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CONFIRMED");
    assert_eq!(body["booking"]["state"], "CONFIRMED");

    let (status, body) = send(&app.router, "GET", &format!("/v1/bookings/{}", id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "CONFIRMED");
    assert_eq!(body["payment_state"], "COMPLETED");
}

#[tokio::test]
async fn test_pay_rejects_wrong_amount_and_other_owner() {
    let app = test_app().await;
    let alice = customer("alice");
    let (_, booking) = reserve(&app, &alice, "4A").await;
    let pay_uri = format!("/v1/bookings/{}/pay", booking["id"].as_str().unwrap());

    let mut wrong = card("tok_visa");
    wrong["amount_cents"] = json!(100);
    let (status, body) = send(&app.router, "POST", &pay_uri, Some(&alice), Some(wrong)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "AMOUNT_MISMATCH");

    let (status, _) = send(&app.router, "POST", &pay_uri, Some(&customer("mallory")), Some(card("tok_visa"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ambiguous_payment_answers_pending_and_blocks_cancel() {
    let app = test_app_with(MockPaymentGateway::new().with_settle_after(100)).await;
    let alice = customer("alice");
    let (_, booking) = reserve(&app, &alice, "5A").await;
    let id = booking["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/v1/bookings/{}/pay", id),
        Some(&alice),
        Some(card(TOKEN_AMBIGUOUS)),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "PENDING");
    assert!(body["payment_attempt_id"].is_string());

    let (status, body) = send(&app.router, "POST", &format!("/v1/bookings/{}/cancel", id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "PAYMENT_IN_FLIGHT");
}

#[tokio::test]
async fn test_pay_after_deadline_is_gone() {
    let app = test_app().await;
    let alice = customer("alice");
    let (_, booking) = reserve(&app, &alice, "6A").await;
    let id = booking["id"].as_str().unwrap().to_string();

    app.clock.advance(chrono::Duration::minutes(11));

    let (status, body) = send(
        &app.router,
        "POST",
        &format!("/v1/bookings/{}/pay", id),
        Some(&alice),
        Some(card("tok_visa")),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "HOLD_EXPIRED");

    let (_, body) = send(&app.router, "GET", &format!("/v1/bookings/{}", id), Some(&alice), None).await;
    assert_eq!(body["state"], "EXPIRED");

    let (status, _) = reserve(&app, &customer("bob"), "6A").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_cancel_releases_seat_and_lists_bookings() {
    let app = test_app().await;
    let alice = customer("alice");
    let (_, booking) = reserve(&app, &alice, "7A").await;
    let id = booking["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app.router, "POST", &format!("/v1/bookings/{}/cancel", id), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "CANCELLED");

    let (_, list) = send(&app.router, "GET", "/v1/bookings", Some(&alice), None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, _) = reserve(&app, &customer("bob"), "7A").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_admin_routes_need_admin_role() {
    let app = test_app().await;
    let alice = customer("alice");
    let (_, booking) = reserve(&app, &alice, "8A").await;
    let id = booking["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app.router, "GET", "/v1/admin/bookings", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = admin();
    let (status, list) = send(&app.router, "GET", "/v1/admin/bookings", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, payments) = send(&app.router, "GET", &format!("/v1/admin/bookings/{}/payments", id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(payments.as_array().unwrap().is_empty());

    let (status, body) = send(&app.router, "POST", &format!("/v1/admin/bookings/{}/cancel", id), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "CANCELLED");
}

#[tokio::test]
async fn test_capacity_edit_is_guarded() {
    let app = test_app().await;
    reserve(&app, &customer("alice"), "15A").await;
    let uri = format!("/v1/admin/flights/{}/capacity", app.flight.id);

    let (status, body) = send(&app.router, "PUT", &uri, Some(&admin()), Some(json!({ "total_seats": 10 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CAPACITY_BELOW_CLAIMS");

    let (status, body) = send(&app.router, "PUT", &uri, Some(&admin()), Some(json!({ "total_seats": 30 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_seats"], 30);

    let (status, _) = reserve(&app, &customer("bob"), "25A").await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_seat_events_reach_subscribers() {
    let app = test_app().await;
    let mut rx = app.seat_events.subscribe();

    reserve(&app, &customer("alice"), "9A").await;

    let event = rx.recv().await.unwrap();
    assert_eq!(event.name(), "seat_held");
    assert_eq!(event.flight_id(), Some(app.flight.id));
}

#[tokio::test]
async fn test_metrics_count_reservations() {
    let app = test_app().await;
    reserve(&app, &customer("alice"), "10A").await;
    reserve(&app, &customer("bob"), "10A").await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()).unwrap();

    assert!(text.contains("skybook_reservations_total{outcome=\"held\"} 1"));
    assert!(text.contains("skybook_reservations_total{outcome=\"seat_taken\"} 1"));
}
