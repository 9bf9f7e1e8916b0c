use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{self, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use signature_cars_backend::config::AppConfig;
use signature_cars_backend::error::PersistError;
use signature_cars_backend::handlers::{router, AppState};
use signature_cars_backend::leads::LeadSubmitter;
use signature_cars_backend::models::Car;
use signature_cars_backend::repo::{CarFilter, ListingRepo, MemoryRepo};
use signature_cars_backend::session::SessionStore;
use signature_cars_backend::staging::ImageStager;
use signature_cars_backend::storage::MemoryObjectStore;
use signature_cars_backend::submission::ListingSubmitter;
use signature_cars_backend::verification::{CodeVerifier, VerificationGate};

const SECRET: &str = "SIGNATURE2024";

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        port: 0,
        verification_code: Some(SECRET.to_string()),
        session_secret: "test-session-secret".to_string(),
        storage_url: "http://storage.local".to_string(),
        storage_service_key: "unused".to_string(),
        storage_bucket: "car_images".to_string(),
    }
}

fn build_test_app() -> (Router, AppState) {
    build_test_app_with_listings(Arc::new(MemoryRepo::new()))
}

fn build_test_app_with_listings(listings: Arc<dyn ListingRepo>) -> (Router, AppState) {
    let sessions = Arc::new(SessionStore::new());
    let gate = Arc::new(VerificationGate::new(
        CodeVerifier::new(Some(SECRET.to_string())),
        sessions,
    ));
    let stager = Arc::new(ImageStager::new(Arc::new(MemoryObjectStore::new())));
    let submitter = Arc::new(ListingSubmitter::new(stager.clone(), listings.clone()));
    let leads = Arc::new(LeadSubmitter::new(Arc::new(MemoryRepo::new())));

    let state = AppState {
        config: test_config(),
        gate,
        stager,
        listings,
        submitter,
        leads,
    };
    (router(state.clone()), state)
}

/// Listing repo that fails the first N inserts, then delegates.
struct FlakyListings {
    inner: MemoryRepo,
    failures_left: AtomicUsize,
}

impl FlakyListings {
    fn new(failures: usize) -> Self {
        Self {
            inner: MemoryRepo::new(),
            failures_left: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl ListingRepo for FlakyListings {
    async fn insert_car(&self, car: Car) -> Result<Car, PersistError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PersistError::Database("insert failed".to_string()));
        }
        self.inner.insert_car(car).await
    }

    async fn list_cars(&self, filter: CarFilter) -> Result<Vec<Car>, PersistError> {
        self.inner.list_cars(filter).await
    }

    async fn find_car(&self, id: Uuid) -> Result<Option<Car>, PersistError> {
        self.inner.find_car(id).await
    }
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should read");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

fn camry_body() -> Value {
    json!({
        "brand": "Toyota",
        "model": "Camry",
        "year": 2023,
        "price": 1_500_000,
        "mileage": 5000,
        "fuel_type": "Petrol",
        "transmission": "Automatic",
        "color": "White",
        "body_type": "Sedan",
        "engine_size": 2.5,
        "power": 200,
        "seats": 5,
        "doors": 4,
        "description": "Well maintained",
    })
}

fn multipart_upload(file_name: &str) -> Request<Body> {
    let boundary = "listing-images-test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"images\"; filename=\"{name}\"\r\n\
         Content-Type: image/jpeg\r\n\r\nnot-really-a-jpeg\r\n--{b}--\r\n",
        b = boundary,
        name = file_name,
    );
    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(
            http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .expect("request should build")
}

fn post_car(listing: &Value, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/cars")
        .header(http::header::CONTENT_TYPE, "application/json")
        .header(http::header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(listing.to_string()))
        .expect("request should build")
}

async fn open_session(app: &Router) -> Uuid {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/verify-session", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    body["session_id"].as_str().unwrap().parse().unwrap()
}

async fn verify(app: &Router, session_id: Uuid, code: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/verify-car-code",
            json!({ "session_id": session_id, "code": code }),
        ))
        .await
        .unwrap();
    let status = response.status();
    (status, response_json(response).await)
}

#[tokio::test]
async fn verified_session_creates_active_listing() {
    let (app, _state) = build_test_app();

    let session_id = open_session(&app).await;
    let (status, body) = verify(&app, session_id, "signature2024").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], json!(true));
    let token = body["token"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("POST")
        .uri("/api/cars")
        .header(http::header::CONTENT_TYPE, "application/json")
        .header(http::header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(camry_body().to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let car = response_json(response).await;
    assert_eq!(car["is_verified"], json!(true));
    assert_eq!(car["status"], json!("active"));
    assert_eq!(car["brand"], json!("Toyota"));

    // The stored listing is now publicly browsable.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/cars?brand=Toyota")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = response_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn wrong_code_reports_remaining_attempts() {
    let (app, _state) = build_test_app();
    let session_id = open_session(&app).await;

    let (status, body) = verify(&app, session_id, "WRONG").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["remaining_attempts"], json!(4));

    let (_, body) = verify(&app, session_id, "WRONG").await;
    assert_eq!(body["remaining_attempts"], json!(3));
}

#[tokio::test]
async fn exhausted_budget_locks_out_even_the_correct_code() {
    let (app, _state) = build_test_app();
    let session_id = open_session(&app).await;

    for _ in 0..4 {
        verify(&app, session_id, "WRONG").await;
    }
    let (status, _) = verify(&app, session_id, "WRONG").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _) = verify(&app, session_id, "SIGNATURE2024").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // A fresh session is unaffected by the locked one.
    let fresh = open_session(&app).await;
    let (status, _) = verify(&app, fresh, "SIGNATURE2024").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn listing_creation_requires_a_session_token() {
    let (app, _state) = build_test_app();
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/cars", camry_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unverified_session_token_is_rejected() {
    let (app, _state) = build_test_app();
    let session_id = open_session(&app).await;
    // Forge a structurally valid token for a session that never verified.
    let token =
        signature_cars_backend::session::issue_session_token(session_id, "test-session-secret")
            .unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/api/cars")
        .header(http::header::CONTENT_TYPE, "application/json")
        .header(http::header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(camry_body().to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_listing_fields_return_per_field_errors() {
    let (app, _state) = build_test_app();
    let session_id = open_session(&app).await;
    let (_, body) = verify(&app, session_id, "SIGNATURE2024").await;
    let token = body["token"].as_str().unwrap().to_string();

    let mut listing = camry_body();
    listing["year"] = json!(1800);
    listing["fuel_type"] = json!("Steam");

    let request = Request::builder()
        .method("POST")
        .uri("/api/cars")
        .header(http::header::CONTENT_TYPE, "application/json")
        .header(http::header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(listing.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    let fields: Vec<_> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap().to_string())
        .collect();
    assert!(fields.contains(&"year".to_string()));
    assert!(fields.contains(&"fuel_type".to_string()));
}

#[tokio::test]
async fn lead_submission_returns_reference_number() {
    let (app, _state) = build_test_app();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/leads",
            json!({
                "full_name": "Jane Doe",
                "email": "jane@example.com",
                "phone": "9876543210",
                "looking_for": "SUV",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let reference = body["reference_number"].as_str().unwrap();
    assert!(reference.starts_with("TSC"));
}

#[tokio::test]
async fn lead_with_short_phone_is_rejected_locally() {
    let (app, _state) = build_test_app();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/leads",
            json!({
                "full_name": "Jane Doe",
                "email": "jane@example.com",
                "phone": "12345",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(body["fields"][0]["field"], json!("phone"));
}

#[tokio::test]
async fn failed_persist_leaves_previews_for_an_identical_retry() {
    let (app, _state) = build_test_app_with_listings(Arc::new(FlakyListings::new(1)));

    let response = app
        .clone()
        .oneshot(multipart_upload("front.jpg"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let staged = response_json(response).await;
    let handle = staged[0]["handle"].as_str().unwrap().to_string();

    let session_id = open_session(&app).await;
    let (_, body) = verify(&app, session_id, "SIGNATURE2024").await;
    let token = body["token"].as_str().unwrap().to_string();

    let mut listing = camry_body();
    listing["images"] = json!([{ "kind": "preview", "handle": handle }]);

    let response = app.clone().oneshot(post_car(&listing, &token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = response_json(response).await;
    assert_eq!(body["reason"], json!("persist_failed"));

    // The same draft, previews, and token go through once the database
    // recovers; nothing had to be re-staged.
    let response = app.clone().oneshot(post_car(&listing, &token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let car = response_json(response).await;
    assert_eq!(car["images"].as_array().unwrap().len(), 1);
    assert_eq!(car["brand"], json!("Toyota"));
}

#[tokio::test]
async fn unknown_car_is_a_404() {
    let (app, _state) = build_test_app();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/cars/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn discarding_an_unknown_preview_is_a_no_op() {
    let (app, _state) = build_test_app();
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/upload/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
