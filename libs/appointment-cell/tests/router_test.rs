mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::router::appointment_routes;
use appointment_cell::AppointmentState;
use common::TestClinic;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

struct TestApp {
    clinic: TestClinic,
    router: Router,
    token: String,
    user: TestUser,
}

fn create_test_app() -> TestApp {
    let config = TestConfig::default();
    let clinic = TestClinic::new();
    let state = AppointmentState::new(config.to_arc(), clinic.service.clone());

    let user = TestUser::owner("owner@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.jwt_secret, None);

    TestApp {
        router: appointment_routes(state),
        clinic,
        token,
        user,
    }
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {}", self.token));

        let body = match body {
            Some(json) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn booking(&self, start: &str) -> Value {
        json!({
            "pet_id": self.clinic.pet,
            "owner_id": self.clinic.owner,
            "practitioner_id": self.clinic.vet,
            "appointment_type": "checkup",
            "start_time": start
        })
    }
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let app = create_test_app();

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let bad_token = JwtTestUtils::create_invalid_signature_token(&app.user);
    let request = Request::builder()
        .method("GET")
        .uri("/")
        .header("Authorization", format!("Bearer {}", bad_token))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .header("Authorization", format!("Bearer {}", JwtTestUtils::create_malformed_token()))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_book_confirm_and_fetch() {
    let app = create_test_app();

    let (status, body) = app.send("POST", "/", Some(app.booking("2024-06-01T09:00:00Z"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["appointment"]["status"], "pending");
    assert_eq!(body["appointment"]["duration_minutes"], 20);
    assert_eq!(body["appointment"]["created_by"], app.user.id.as_str());

    let id = body["appointment"]["id"].as_str().unwrap().to_string();

    let (status, body) = app.send("POST", &format!("/{}/confirm", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "confirmed");

    let (status, body) = app.send("GET", &format!("/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");
}

#[tokio::test]
async fn test_error_statuses() {
    let app = create_test_app();

    let (status, _) = app.send("POST", "/", Some(app.booking("2024-06-01T09:00:00Z"))).await;
    assert_eq!(status, StatusCode::CREATED);

    // Inside the buffer of the first booking.
    let (status, body) = app.send("POST", "/", Some(app.booking("2024-06-01T09:25:00Z"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let mut wrong_owner = app.booking("2024-06-01T15:00:00Z");
    wrong_owner["owner_id"] = json!(app.clinic.other_owner);
    let (status, _) = app.send("POST", "/", Some(wrong_owner)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send("POST", "/", Some(app.booking("not-a-time"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation_error");

    let (status, _) = app.send("GET", &format!("/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_patch_status_and_delete() {
    let app = create_test_app();

    let (_, body) = app.send("POST", "/", Some(app.booking("2024-06-01T09:00:00Z"))).await;
    let id = body["appointment"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send("PATCH", &format!("/{}", id), Some(json!({ "start_time": "2024-06-01T11:00:00Z" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["appointment_type"], "checkup");
    assert_eq!(body["appointment"]["start_time"], "2024-06-01T11:00:00Z");

    let (status, body) = app
        .send("PUT", &format!("/{}/status", id), Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "cancelled");

    let (status, _) = app.send("POST", &format!("/{}/confirm", id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send("DELETE", &format!("/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send("DELETE", &format!("/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_and_slots() {
    let app = create_test_app();

    app.send("POST", "/", Some(app.booking("2024-06-01T09:00:00Z"))).await;
    app.send("POST", "/", Some(app.booking("2024-06-01T13:00:00Z"))).await;

    let (status, body) = app
        .send("GET", &format!("/?pet_id={}&limit=1&page=2", app.clinic.pet), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["appointments"].as_array().unwrap().len(), 1);
    assert_eq!(body["appointments"][0]["start_time"], "2024-06-01T13:00:00Z");

    let uri = format!("/slots?date=2024-06-01&type=vaccination&practitioner_id={}", app.clinic.vet);
    let (status, body) = app.send("GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duration_minutes"], 20);

    let slots = body["practitioners"][0]["slots"].as_array().unwrap();
    assert_eq!(slots[0]["start_time"], "2024-06-01T08:00:00Z");
    // 09:00..09:20 is booked, so the walk resumes at 09:30.
    let starts: Vec<&str> = slots.iter().filter_map(|s| s["start_time"].as_str()).collect();
    assert!(starts.contains(&"2024-06-01T08:40:00Z"));
    assert!(!starts.contains(&"2024-06-01T09:00:00Z"));
    assert!(starts.contains(&"2024-06-01T09:30:00Z"));
}
