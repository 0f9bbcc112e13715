use serde_json::json;
use warp::hyper::{Method, StatusCode};

use crate::http::{response_json, TestServer};

#[tokio::test]
async fn test_metadata_endpoints() {
    let server = TestServer::start().await;

    let resp = server
        .request(Method::GET, "/primary-key/public.employee", None)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-runtime"));
    assert_eq!(
        response_json(resp).await,
        json!([{"column_name": "id", "data_type": "integer"}])
    );

    let resp = server
        .request(Method::GET, "/columns/employee?complete_attribute=true", None)
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let columns = response_json(resp).await;
    assert_eq!(columns.as_array().unwrap().len(), 4);
    assert_eq!(columns[2]["column_name"], "department_id");
    assert_eq!(columns[2]["table_name"], "employee");
    assert_eq!(columns[2]["udt_name"], "int4");

    let resp = server
        .request(Method::GET, "/foreign-keys/employee", None)
        .await;
    let foreign_keys = response_json(resp).await;
    assert_eq!(
        foreign_keys[1],
        json!({
            "table_schema": "public",
            "constraint_name": "employee_manager_id_fkey",
            "table_name": "employee",
            "column_name": "manager_id",
            "foreign_table_schema": "public",
            "foreign_table_name": "employee",
            "foreign_column_name": "id",
        })
    );

    server.stop().await;
}

#[tokio::test]
async fn test_list_with_nested_filters() {
    let server = TestServer::start().await;

    // (department_id = 1) AND (name LIKE 'G%' OR id IN (3))
    let resp = server
        .request(
            Method::POST,
            "/data/table",
            Some(json!({
                "table_name": "employee",
                "query": [{
                    "and_": [{"column_name": "department_id", "operator": "=", "value": 1}],
                    "or_": [
                        {"column_name": "name", "operator": "LIKE", "value": "G%"},
                        {"column_name": "id", "operator": "IN", "value": [3]},
                    ],
                }],
            })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let rows = response_json(resp).await;
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["name"], "Grace");
    assert_eq!(rows[0]["department"], json!({"id": 1, "name": "Engineering"}));
    assert_eq!(rows[0]["employee"]["name"], "Ada");

    server.stop().await;
}

#[tokio::test]
async fn test_list_pagination() {
    let server = TestServer::start().await;

    let resp = server
        .request(
            Method::POST,
            "/data/table",
            Some(json!({"table_name": "employee", "page": 2, "page_size": 2})),
        )
        .await;
    let rows = response_json(resp).await;
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["name"], "Linus");

    let resp = server
        .request(
            Method::POST,
            "/data/table",
            Some(json!({"table_name": "employee", "page": 3, "page_size": 2})),
        )
        .await;
    assert_eq!(response_json(resp).await, json!([]));

    server.stop().await;
}

#[tokio::test]
async fn test_invalid_operator() {
    let server = TestServer::start().await;

    let resp = server
        .request(
            Method::POST,
            "/data/table",
            Some(json!({
                "table_name": "employee",
                "query": [{"column_name": "id", "operator": "; DROP TABLE employee", "value": 1}],
            })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    server.stop().await;
}

#[tokio::test]
async fn test_undecodable_body() {
    let server = TestServer::start().await;

    let resp = server
        .request(
            Method::POST,
            "/data/table",
            Some(json!({
                "table_name": "employee",
                "query": [{"column_name": "name", "operater": "=", "value": "Ada"}],
            })),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.headers().get("content-type").unwrap().to_str().unwrap(),
        "application/json"
    );
    let error = response_json(resp).await;
    assert!(error["error"]
        .as_str()
        .unwrap()
        .starts_with("Request body deserialize error"));

    server.stop().await;
}

#[tokio::test]
async fn test_cors_preflight() {
    let server = TestServer::start().await;

    let request = warp::hyper::Request::builder()
        .method(Method::OPTIONS)
        .uri(format!("http://127.0.0.1:{}/data/table", server.port))
        .header("Origin", "https://example.org")
        .header("Access-Control-Request-Method", "PUT")
        .body(warp::hyper::Body::empty())
        .unwrap();
    let resp = warp::hyper::Client::new().request(request).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .unwrap()
            .to_str()
            .unwrap(),
        "https://example.org"
    );

    server.stop().await;
}
