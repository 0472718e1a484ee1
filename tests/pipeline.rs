//! End-to-end request pipeline behavior through the assembled router.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::Router;
use crudkit::{
    ApiError, App, AppConfig, Authenticator, Identity, OperationConfig, Resource, Schema,
};
use http::{HeaderMap, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

/// Accepts `authorization: Bearer valid` and nothing else.
struct BearerAuth;

#[async_trait]
impl Authenticator for BearerAuth {
    async fn resolve(&self, headers: &HeaderMap) -> Option<Identity> {
        let token = headers.get("authorization")?.to_str().ok()?;
        (token == "Bearer valid").then(|| Identity {
            session: json!({"token": "valid"}),
            user: json!({"id": "u1", "name": "Alice"}),
        })
    }
}

fn store_schema() -> Schema {
    Schema::new(json!({
        "type": "object",
        "properties": {
            "id": { "type": "string" },
            "name": { "type": "string" }
        },
        "required": ["id", "name"]
    }))
    .expect("schema compiles")
}

fn create_store_req() -> Schema {
    Schema::new(json!({
        "type": "object",
        "properties": { "name": { "type": "string" } },
        "required": ["name"]
    }))
    .expect("schema compiles")
}

fn router_for(resource: Resource) -> Router {
    App::new(AppConfig::default())
        .register(resource)
        .into_router()
        .expect("router builds")
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

fn post_json(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn protected_operation_rejects_anonymous_before_invoking_handler() {
    let invoked = Arc::new(AtomicBool::new(false));
    let flag = invoked.clone();
    let stores = Resource::new("stores", store_schema()).unwrap().list(move |_ctx| {
        let flag = flag.clone();
        async move {
            flag.store(true, Ordering::SeqCst);
            Ok(json!([]))
        }
    });

    let response = router_for(stores).oneshot(get("/stores")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], json!("UNAUTHORIZED"));
    assert!(!invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn authenticated_request_reaches_handler_with_identity() {
    let stores = Resource::new("stores", store_schema())
        .unwrap()
        .read(|ctx| async move {
            let user = ctx.user.clone().unwrap_or_default();
            Ok(json!({
                "id": ctx.param("storeId").unwrap_or_default(),
                "name": user["name"].clone(),
            }))
        });

    let router = App::new(AppConfig::default())
        .authenticator(Arc::new(BearerAuth))
        .register(stores)
        .into_router()
        .unwrap();

    let request = Request::builder()
        .uri("/stores/s42")
        .header("authorization", "Bearer valid")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body, json!({"data": {"id": "s42", "name": "Alice"}}));
}

#[tokio::test]
async fn invalid_credentials_are_anonymous() {
    let stores = Resource::new("stores", store_schema())
        .unwrap()
        .list(|_ctx| async { Ok(json!([])) });

    let router = App::new(AppConfig::default())
        .authenticator(Arc::new(BearerAuth))
        .register(stores)
        .into_router()
        .unwrap();

    let request = Request::builder()
        .uri("/stores")
        .header("authorization", "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn list_wraps_result_in_data_envelope() {
    let stores = Resource::new("stores", store_schema())
        .unwrap()
        .list_with(OperationConfig::public(), |_ctx| async { Ok(json!([])) });

    let response = router_for(stores).oneshot(get("/stores")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"data": []}));
}

#[tokio::test]
async fn create_answers_201_with_envelope() {
    let stores = Resource::new("stores", store_schema()).unwrap().create_with(
        OperationConfig::public(),
        create_store_req(),
        |ctx| async move {
            let input = ctx.input.clone().unwrap_or_default();
            Ok(json!({"id": "s1", "name": input["name"].clone()}))
        },
    );

    let response = router_for(stores)
        .oneshot(post_json("/stores", r#"{"name": "Main"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        body_json(response).await,
        json!({"data": {"id": "s1", "name": "Main"}})
    );
}

#[tokio::test]
async fn malformed_json_body_is_invalid_input() {
    let stores = Resource::new("stores", store_schema()).unwrap().create_with(
        OperationConfig::public(),
        create_store_req(),
        |_ctx| async { Ok(json!({"id": "s1", "name": "x"})) },
    );

    let response = router_for(stores)
        .oneshot(post_json("/stores", "{not json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], json!("INVALID_INPUT"));
}

#[tokio::test]
async fn schema_violating_body_is_invalid_input_with_details() {
    let stores = Resource::new("stores", store_schema()).unwrap().create_with(
        OperationConfig::public(),
        create_store_req(),
        |_ctx| async { Ok(json!({"id": "s1", "name": "x"})) },
    );

    let response = router_for(stores)
        .oneshot(post_json("/stores", r#"{"name": 42}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], json!("INVALID_INPUT"));
    let details = body["details"].as_array().expect("details is a list");
    assert!(details.iter().any(|d| d["pointer"] == json!("/name")));
}

#[tokio::test]
async fn handler_error_maps_kind_to_status_without_details() {
    let stores = Resource::new("stores", store_schema())
        .unwrap()
        .read_with(OperationConfig::public(), |_ctx| async {
            Err(ApiError::not_found("store not found"))
        });

    let response = router_for(stores)
        .oneshot(get("/stores/missing"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({"error": "NOT_FOUND", "message": "store not found"})
    );
}

#[tokio::test]
async fn conflict_maps_to_409() {
    let stores = Resource::new("stores", store_schema()).unwrap().create_with(
        OperationConfig::public(),
        create_store_req(),
        |_ctx| async { Err(ApiError::conflict("store name already taken")) },
    );

    let response = router_for(stores)
        .oneshot(post_json("/stores", r#"{"name": "Main"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn response_schema_violation_is_invalid_data() {
    let stores = Resource::new("stores", store_schema())
        .unwrap()
        .read_with(OperationConfig::public(), |_ctx| async {
            // `id` has the wrong type and `name` is missing.
            Ok(json!({"id": 7}))
        });

    let response = router_for(stores).oneshot(get("/stores/s1")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], json!("INVALID_DATA"));
    assert!(body["details"].is_array());
}

#[tokio::test]
async fn list_response_is_validated_per_element() {
    let stores = Resource::new("stores", store_schema())
        .unwrap()
        .list_with(OperationConfig::public(), |_ctx| async {
            Ok(json!([{"id": "a", "name": "ok"}, {"id": "b"}]))
        });

    let response = router_for(stores).oneshot(get("/stores")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], json!("INVALID_DATA"));
}

#[tokio::test]
async fn delete_answers_204_with_empty_body() {
    let stores = Resource::new("stores", store_schema())
        .unwrap()
        .delete_with(OperationConfig::public(), |_ctx| async { Ok(json!(null)) });

    let response = router_for(stores)
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/stores/s1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn nested_path_params_reach_the_handler() {
    let stores = Resource::new("stores", store_schema()).unwrap();
    let products = Resource::nested(&stores, "products", Schema::new(json!({"type": "object"})).unwrap())
        .unwrap()
        .read_with(OperationConfig::public(), |ctx| async move {
            Ok(json!({
                "store": ctx.param("storeId"),
                "product": ctx.param("productId"),
            }))
        });

    let response = router_for(products)
        .oneshot(get("/stores/s1/products/p9"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"data": {"store": "s1", "product": "p9"}})
    );
}

#[tokio::test]
async fn handler_panic_becomes_500_envelope() {
    let stores = Resource::new("stores", store_schema())
        .unwrap()
        .list_with(OperationConfig::public(), |_ctx| async {
            panic!("storage backend exploded")
        });

    let response = router_for(stores).oneshot(get("/stores")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], json!("INTERNAL_SERVER_ERROR"));
}

#[tokio::test]
async fn panicked_error_value_translates_like_a_returned_one() {
    let stores = Resource::new("stores", store_schema())
        .unwrap()
        .list_with(OperationConfig::public(), |_ctx| async {
            std::panic::panic_any(ApiError::forbidden("not allowed"))
        });

    let response = router_for(stores).oneshot(get("/stores")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({"error": "FORBIDDEN", "message": "not allowed"})
    );
}

#[tokio::test]
async fn health_endpoint_reports_status_and_request_id() {
    let router = App::new(AppConfig::default()).into_router().unwrap();
    let response = router.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("healthy"));
}

#[tokio::test]
async fn openapi_document_is_served_uncached() {
    let stores = Resource::new("stores", store_schema())
        .unwrap()
        .list_with(OperationConfig::public(), |_ctx| async { Ok(json!([])) });

    let response = router_for(stores)
        .oneshot(get("/openapi.json"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "no-store"
    );
    let body = body_json(response).await;
    assert!(body["paths"]["/stores"]["get"].is_object());
}

#[tokio::test]
async fn docs_can_be_disabled() {
    let config = AppConfig {
        enable_docs: false,
        ..AppConfig::default()
    };
    let router = App::new(config).into_router().unwrap();
    let response = router.oneshot(get("/openapi.json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_validates_body_and_answers_200() {
    let stores = Resource::new("stores", store_schema()).unwrap().update_with(
        OperationConfig::public(),
        create_store_req(),
        |ctx| async move {
            let input = ctx.input.clone().unwrap_or_default();
            Ok(json!({
                "id": ctx.param("storeId").unwrap_or_default(),
                "name": input["name"].clone(),
            }))
        },
    );

    let request = Request::builder()
        .method("PATCH")
        .uri("/stores/s1")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"name": "Renamed"}"#))
        .unwrap();
    let response = router_for(stores).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"data": {"id": "s1", "name": "Renamed"}})
    );
}
