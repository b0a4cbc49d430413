//! Fulfillment pipeline of paid orders.
//!
//! Tests cover:
//! - One-step advance through received, in production, ready and delivered
//! - Cancellation from every non-terminal status
//! - Rejections leave the order untouched and notify nobody
//! - Delivery dates, reads and deletion over HTTP

mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use bakery_orders::{
    entities::{order::OrderStatus, order_line},
    errors::ServiceError,
    services::order_status::TransitionOutcome,
};
use common::{json_body, TestApp};
use rstest::rstest;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use uuid::Uuid;

async fn advance_times(app: &TestApp, order_id: Uuid, times: usize) {
    for _ in 0..times {
        let outcome = app
            .state
            .services
            .lifecycle
            .advance(order_id)
            .await
            .expect("advance succeeds");
        assert!(outcome.is_applied());
    }
}

#[tokio::test]
async fn advance_walks_the_pipeline_one_step_at_a_time() {
    let app = TestApp::new().await;
    let placed = app.place_paid_order().await;
    let lifecycle = &app.state.services.lifecycle;

    let mut seen = Vec::new();
    for _ in 0..3 {
        let outcome = lifecycle.advance(placed.order_id).await.unwrap();
        seen.push(outcome.status());
    }
    assert_eq!(
        seen,
        vec![
            OrderStatus::InProduction,
            OrderStatus::Ready,
            OrderStatus::Delivered
        ]
    );

    let past_end = lifecycle.advance(placed.order_id).await.unwrap();
    assert_matches!(
        past_end,
        TransitionOutcome::Rejected { current: OrderStatus::Delivered, .. }
    );

    // received on commit, plus one per applied step
    let notes = app.notifier.for_order(placed.order_id);
    assert_eq!(notes.len(), 4);
    assert_eq!(notes[3].metadata["status"], "delivered");
    assert_eq!(notes[3].body, "Your order is now delivered.");
}

#[rstest]
#[case::received(0, true)]
#[case::in_production(1, true)]
#[case::ready(2, true)]
#[case::delivered(3, false)]
#[tokio::test]
async fn cancellation_is_allowed_until_delivery(#[case] steps: usize, #[case] allowed: bool) {
    let app = TestApp::new().await;
    let placed = app.place_paid_order().await;
    advance_times(&app, placed.order_id, steps).await;
    let before = app.notifier.for_order(placed.order_id).len();

    let outcome = app
        .state
        .services
        .lifecycle
        .cancel(placed.order_id)
        .await
        .unwrap();

    assert_eq!(outcome.is_applied(), allowed);
    let after = app.notifier.for_order(placed.order_id).len();
    assert_eq!(after - before, usize::from(allowed));
}

#[tokio::test]
async fn cancelled_order_cannot_advance_or_cancel_again() {
    let app = TestApp::new().await;
    let placed = app.place_paid_order().await;
    let lifecycle = &app.state.services.lifecycle;
    lifecycle.cancel(placed.order_id).await.unwrap();
    let notified = app.notifier.for_order(placed.order_id).len();

    let advance = lifecycle.advance(placed.order_id).await.unwrap();
    assert_matches!(
        &advance,
        TransitionOutcome::Rejected { current: OrderStatus::Cancelled, reason }
            if reason.contains("Cannot advance")
    );
    let again = lifecycle.cancel(placed.order_id).await.unwrap();
    assert!(!again.is_applied());

    let order = app
        .state
        .services
        .orders
        .get_order_with_lines(placed.order_id)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(app.notifier.for_order(placed.order_id).len(), notified);
}

#[tokio::test]
async fn transitions_on_missing_orders_are_not_found() {
    let app = TestApp::new().await;
    let lifecycle = &app.state.services.lifecycle;

    assert_matches!(
        lifecycle.advance(Uuid::new_v4()).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        lifecycle.cancel(Uuid::new_v4()).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn advance_and_cancel_over_http() {
    let app = TestApp::new().await;
    let placed = app.place_paid_order().await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/advance", placed.order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["status"], "in_production");
    assert_eq!(body["data"]["previous_status"], "received");

    advance_times(&app, placed.order_id, 2).await;
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{}/cancel", placed.order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["status"], "delivered");
}

#[tokio::test]
async fn delivery_date_can_be_set_in_any_status() {
    let app = TestApp::new().await;
    let placed = app.place_paid_order().await;
    app.state
        .services
        .lifecycle
        .cancel(placed.order_id)
        .await
        .unwrap();

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/delivery-date", placed.order_id),
            Some(json!({ "deliveryDate": "2024-09-18T15:00:00Z" })),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["status"], "cancelled");
    assert!(body["data"]["delivery_date"]
        .as_str()
        .unwrap()
        .starts_with("2024-09-18T15:00:00"));

    let missing = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{}/delivery-date", Uuid::new_v4()),
            Some(json!({ "delivery_date": "2024-09-18T15:00:00Z" })),
        )
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn orders_are_listed_per_owner_and_read_with_lines() {
    let app = TestApp::new().await;
    let placed = app.place_paid_order().await;

    let list = app
        .request(
            Method::GET,
            &format!("/api/v1/orders?owner_id={}", app.owner_id),
            None,
        )
        .await;
    assert_eq!(list.status(), StatusCode::OK);
    let list = json_body(list).await;
    assert_eq!(list["data"]["total"], 1);
    assert_eq!(list["data"]["orders"][0]["id"], placed.order_id.to_string());

    let other = app
        .request(
            Method::GET,
            &format!("/api/v1/orders?owner_id={}", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(json_body(other).await["data"]["total"], 0);

    let detail = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", placed.order_id),
            None,
        )
        .await;
    let detail = json_body(detail).await;
    assert_eq!(detail["data"]["lines"].as_array().unwrap().len(), 2);
    assert_eq!(detail["data"]["status"], "received");
}

#[tokio::test]
async fn deleting_an_order_removes_its_lines() {
    let app = TestApp::new().await;
    let placed = app.place_paid_order().await;

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/orders/{}", placed.order_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let remaining = order_line::Entity::find()
        .filter(order_line::Column::OrderId.eq(placed.order_id))
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(remaining, 0);

    let gone = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", placed.order_id),
            None,
        )
        .await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}
