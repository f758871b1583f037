// libs/appointment-cell/tests/router_test.rs
mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::router::appointment_routes;
use shared_utils::test_utils::{JwtTestUtils, TestUser};

use common::{t, Harness};

fn app(h: &Harness) -> Router {
    appointment_routes(h.state.clone())
}

fn token_for(h: &Harness, user: &TestUser) -> String {
    JwtTestUtils::create_test_token(user, &h.config.jwt_secret, None)
}

fn request(method: &str, uri: String, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn booking_body(h: &Harness, start: &str) -> Value {
    json!({
        "doctor_id": h.doctor_id,
        "clinic_id": h.clinic_id,
        "patient_id": h.patient_id,
        "date": "2026-10-19",
        "start_time": start
    })
}

fn patient_user(h: &Harness) -> TestUser {
    TestUser::with_id(h.patient_id, "patient@example.com", "patient")
}

fn doctor_user(h: &Harness) -> TestUser {
    TestUser::with_id(h.doctor_id, "doctor@example.com", "doctor")
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let h = Harness::new().await;

    let response = app(&h)
        .oneshot(request("GET", format!("/slots?doctor_id={}&date=2026-10-19", h.doctor_id), None, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_slots_endpoint_lists_day_grid() {
    let h = Harness::new().await;
    h.book_other(t(9, 30)).await;
    let token = token_for(&h, &patient_user(&h));

    let response = app(&h)
        .oneshot(request(
            "GET",
            format!("/slots?doctor_id={}&clinic_id={}&date=2026-10-19", h.doctor_id, h.clinic_id),
            Some(&token),
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 6);
    assert_eq!(slots[0]["start_time"], "09:00:00");
    assert_eq!(slots[0]["available"], true);
    assert_eq!(slots[1]["available"], false);

    let unknown = app(&h)
        .oneshot(request(
            "GET",
            format!("/slots?doctor_id={}&date=2026-10-19", Uuid::new_v4()),
            Some(&token),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_booking_twice_conflicts() {
    let h = Harness::new().await;
    let token = token_for(&h, &patient_user(&h));

    let created = app(&h)
        .oneshot(request("POST", "/".to_string(), Some(&token), Some(booking_body(&h, "10:00:00"))))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let appointment = body_json(created).await;
    assert_eq!(appointment["status"], "scheduled");
    assert_eq!(appointment["starts_at"], "2026-10-19T10:00:00");

    let again = app(&h)
        .oneshot(request("POST", "/".to_string(), Some(&token), Some(booking_body(&h, "10:00:00"))))
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_booking_for_someone_else_is_forbidden() {
    let h = Harness::new().await;
    let stranger = TestUser::patient("stranger@example.com");
    let token = token_for(&h, &stranger);

    let response = app(&h)
        .oneshot(request("POST", "/".to_string(), Some(&token), Some(booking_body(&h, "09:00:00"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_lifecycle_over_http() {
    let h = Harness::new().await;
    let appointment = h.book_own(t(9, 0)).await;
    let doctor = token_for(&h, &doctor_user(&h));
    let patient = token_for(&h, &patient_user(&h));

    let fetched = app(&h)
        .oneshot(request("GET", format!("/{}", appointment.id), Some(&patient), None))
        .await
        .unwrap();
    assert_eq!(fetched.status(), StatusCode::OK);

    let missing = app(&h)
        .oneshot(request("GET", format!("/{}", Uuid::new_v4()), Some(&patient), None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let started = app(&h)
        .oneshot(request("POST", format!("/{}/start", appointment.id), Some(&doctor), None))
        .await
        .unwrap();
    assert_eq!(started.status(), StatusCode::OK);

    let session = app(&h)
        .oneshot(request("GET", format!("/{}/session", appointment.id), Some(&patient), None))
        .await
        .unwrap();
    assert_eq!(body_json(session).await["active"], true);

    let no_diagnosis = app(&h)
        .oneshot(request(
            "POST",
            format!("/{}/complete", appointment.id),
            Some(&doctor),
            Some(json!({ "prescription": "rest" })),
        ))
        .await
        .unwrap();
    assert_eq!(no_diagnosis.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let completed = app(&h)
        .oneshot(request(
            "POST",
            format!("/{}/complete", appointment.id),
            Some(&doctor),
            Some(json!({ "diagnosis": "common cold" })),
        ))
        .await
        .unwrap();
    assert_eq!(completed.status(), StatusCode::OK);
    let body = body_json(completed).await;
    assert_eq!(body["appointment"]["status"], "completed");
    assert_eq!(body["note"]["diagnosis"], "common cold");

    let cancel = app(&h)
        .oneshot(request(
            "POST",
            format!("/{}/cancel", appointment.id),
            Some(&doctor),
            Some(json!({ "reason": "too late" })),
        ))
        .await
        .unwrap();
    assert_eq!(cancel.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_without_body_uses_default_reason() {
    let h = Harness::new().await;
    let appointment = h.book_own(t(10, 0)).await;
    let patient = token_for(&h, &patient_user(&h));

    let response = app(&h)
        .oneshot(request("POST", format!("/{}/cancel", appointment.id), Some(&patient), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "cancelled");
    assert!(body["notes"].as_str().unwrap().ends_with("no reason given"));

    let other = h.book_own(t(11, 0)).await;
    let with_reason = app(&h)
        .oneshot(request(
            "POST",
            format!("/{}/cancel", other.id),
            Some(&patient),
            Some(json!({ "reason": "feeling better" })),
        ))
        .await
        .unwrap();
    assert_eq!(with_reason.status(), StatusCode::OK);
    assert!(body_json(with_reason).await["notes"].as_str().unwrap().ends_with("feeling better"));
}

#[tokio::test]
async fn test_reschedule_and_no_show_status_codes() {
    let h = Harness::new().await;
    let appointment = h.book_own(t(9, 0)).await;
    let patient = token_for(&h, &patient_user(&h));
    let doctor = token_for(&h, &doctor_user(&h));

    let past = app(&h)
        .oneshot(request(
            "POST",
            format!("/{}/reschedule", appointment.id),
            Some(&patient),
            Some(json!({ "new_date": "2026-10-12", "new_start_time": "09:00:00" })),
        ))
        .await
        .unwrap();
    assert_eq!(past.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let moved = app(&h)
        .oneshot(request(
            "POST",
            format!("/{}/reschedule", appointment.id),
            Some(&patient),
            Some(json!({ "new_date": "2026-10-19", "new_start_time": "11:30:00", "reason": "work" })),
        ))
        .await
        .unwrap();
    assert_eq!(moved.status(), StatusCode::OK);
    assert_eq!(body_json(moved).await["ends_at"], "2026-10-19T12:00:00");

    let early = app(&h)
        .oneshot(request("POST", format!("/{}/no-show", appointment.id), Some(&doctor), None))
        .await
        .unwrap();
    assert_eq!(early.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_conflict_check_is_for_the_doctors_staff() {
    let h = Harness::new().await;
    let booked = h.book_other(t(9, 0)).await;
    let uri = format!(
        "/conflicts/check?doctor_id={}&starts_at=2026-10-19T09:15:00&ends_at=2026-10-19T09:45:00",
        h.doctor_id
    );

    let by_patient = app(&h)
        .oneshot(request("GET", uri.clone(), Some(&token_for(&h, &patient_user(&h))), None))
        .await
        .unwrap();
    assert_eq!(by_patient.status(), StatusCode::FORBIDDEN);

    let assistant = TestUser::assistant("assistant@example.com", &h.doctor_id.to_string());
    let response = app(&h)
        .oneshot(request("GET", uri, Some(&token_for(&h, &assistant)), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["has_conflict"], true);
    assert_eq!(body["conflicting_appointments"][0]["id"], json!(booked.id));
}
