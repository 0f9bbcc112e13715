use serde_json::json;
use warp::hyper::{Method, StatusCode};

use crate::http::{response_json, TestServer};

#[tokio::test]
async fn test_create_then_read_back() {
    let server = TestServer::start().await;

    let resp = server
        .request(
            Method::PUT,
            "/data/table",
            Some(json!({
                "table_name": "employee",
                "data": {"name": "Barbara", "department_id": 2, "manager_id": 3, "nickname": "Babs"},
            })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(response_json(resp).await, json!(4));

    let resp = server
        .request(
            Method::POST,
            "/data/table/id",
            Some(json!({"table_name": "employee", "id": 4})),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        response_json(resp).await,
        json!({"id": 4, "name": "Barbara", "department_id": 2, "manager_id": 3})
    );

    let resp = server
        .request(
            Method::POST,
            "/data/table",
            Some(json!({
                "table_name": "employee",
                "query": [{"column_name": "name", "operator": "=", "value": "Barbara"}],
            })),
        )
        .await;
    let rows = response_json(resp).await;
    assert_eq!(rows[0]["department"]["name"], "Sales");
    assert_eq!(rows[0]["employee"]["name"], "Linus");

    server.stop().await;
}

#[tokio::test]
async fn test_create_returning_record() {
    let server = TestServer::start().await;

    let resp = server
        .request(
            Method::PUT,
            "/data/table",
            Some(json!({
                "schema_name": "public",
                "table_name": "assignment",
                "data": {"employee_id": 3, "project": "compiler"},
                "return_id": false,
            })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        response_json(resp).await,
        json!({"employee_id": 3, "project": "compiler"})
    );

    // Same composite key again
    let resp = server
        .request(
            Method::PUT,
            "/data/table",
            Some(json!({
                "table_name": "assignment",
                "data": {"employee_id": 3, "project": "compiler"},
            })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert!(response_json(resp).await["error"].is_string());

    server.stop().await;
}

#[tokio::test]
async fn test_composite_key_lookup() {
    let server = TestServer::start().await;

    let resp = server
        .request(
            Method::POST,
            "/data/table/id",
            Some(json!({"table_name": "assignment", "ids": [3, "kernel"]})),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        response_json(resp).await,
        json!({"employee_id": 3, "project": "kernel"})
    );

    let resp = server
        .request(
            Method::POST,
            "/data/table/id",
            Some(json!({"table_name": "assignment", "id": 3})),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response_json(resp).await,
        json!({"error": "IDs value is required"})
    );

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_table() {
    let server = TestServer::start().await;

    let resp = server
        .request(
            Method::PUT,
            "/data/table",
            Some(json!({"table_name": "sales.orders", "data": {"total": 1}})),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response_json(resp).await,
        json!({"error": "Table \"sales.orders\" doesn't exist"})
    );

    server.stop().await;
}
