use std::future::Future;
use std::{net::SocketAddr, sync::Arc, time::Duration};

use percent_encoding::percent_decode_str;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info};
use warp::{Filter, Reply};

use crate::catalog::{CatalogError, CatalogResult};
use crate::config::schema::HttpFrontend;
use crate::context::TablegateContext;
use crate::data_types::{Pagination, TableRef};
use crate::query::condition::{Filter as QueryFilter, ScalarValue};

use super::http_utils::{handle_rejection, into_response, ApiError};
use super::timing::{instrument, with_runtime_header};

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct TableParams {
    schema_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ColumnsParams {
    schema_name: Option<String>,
    complete_attribute: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct AttributesParams {
    schema_name: Option<String>,
    complete_attribute: bool,
    with_data: bool,
    page: u32,
    page_size: Option<u32>,
    keyword: Option<String>,
}

impl Default for AttributesParams {
    fn default() -> Self {
        Self {
            schema_name: None,
            complete_attribute: false,
            with_data: false,
            page: default_page(),
            page_size: None,
            keyword: None,
        }
    }
}

fn default_page() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

// POST /data/table
#[derive(Debug, Deserialize)]
struct TableDataBody {
    schema_name: Option<String>,
    table_name: String,
    #[serde(default = "default_page")]
    page: u32,
    page_size: Option<u32>,
    keyword: Option<String>,
    #[serde(default)]
    query: Vec<QueryFilter>,
}

// POST /data/table/id
#[derive(Debug, Deserialize)]
struct TableRecordBody {
    schema_name: Option<String>,
    table_name: String,
    id: Option<ScalarValue>,
    #[serde(default)]
    ids: Vec<ScalarValue>,
    custom_column: Option<String>,
}

// PUT /data/table
#[derive(Debug, Deserialize)]
struct CreateRecordBody {
    schema_name: Option<String>,
    table_name: String,
    data: Map<String, JsonValue>,
    #[serde(default = "default_true")]
    return_id: bool,
    primary_key_column: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Table names in the path may be percent-encoded (e.g. `sales%2Eorders`)
fn path_table(
    context: &TablegateContext,
    raw: &str,
    schema_name: Option<&str>,
) -> CatalogResult<TableRef> {
    let identifier = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| CatalogError::validation(format!("Invalid table identifier {raw:?}")))?;
    context.resolve_table(&identifier, schema_name)
}

fn pagination(page: u32, page_size: Option<u32>, default_page_size: u32) -> CatalogResult<Pagination> {
    let page_size = page_size.unwrap_or(default_page_size);
    if page == 0 || page_size == 0 {
        return Err(CatalogError::validation(
            "page and page_size must be at least 1",
        ));
    }
    Ok(Pagination::new(page, page_size))
}

async fn with_timeout<T>(
    timeout: Duration,
    future: impl Future<Output = CatalogResult<T>>,
) -> Result<T, ApiError> {
    Ok(tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| ApiError::Timeout)??)
}

// GET /primary-key/[table]
async fn primary_key(
    table: String,
    params: TableParams,
    context: Arc<TablegateContext>,
    timeout: Duration,
) -> Result<impl Reply, ApiError> {
    let table = path_table(&context, &table, params.schema_name.as_deref())?;
    let primary_key = with_timeout(timeout, context.get_primary_key(&table)).await?;
    Ok(warp::reply::json(&primary_key))
}

// GET /columns/[table]
async fn columns(
    table: String,
    params: ColumnsParams,
    context: Arc<TablegateContext>,
    timeout: Duration,
) -> Result<impl Reply, ApiError> {
    let table = path_table(&context, &table, params.schema_name.as_deref())?;
    let columns = with_timeout(
        timeout,
        context.get_columns(&table, params.complete_attribute),
    )
    .await?;
    Ok(warp::reply::json(&columns))
}

// GET /foreign-keys/[table]
async fn foreign_keys(
    table: String,
    params: TableParams,
    context: Arc<TablegateContext>,
    timeout: Duration,
) -> Result<impl Reply, ApiError> {
    let table = path_table(&context, &table, params.schema_name.as_deref())?;
    let foreign_keys = with_timeout(timeout, context.get_foreign_keys(&table)).await?;
    Ok(warp::reply::json(&foreign_keys))
}

// GET /attributes/[table]
async fn attributes(
    table: String,
    params: AttributesParams,
    context: Arc<TablegateContext>,
    timeout: Duration,
) -> Result<impl Reply, ApiError> {
    let table = path_table(&context, &table, params.schema_name.as_deref())?;
    let pagination = pagination(params.page, params.page_size, context.default_page_size)?;
    let keyword = non_empty(params.keyword);

    let attributes = with_timeout(
        timeout,
        context.get_table_attributes(
            &table,
            params.complete_attribute,
            params.with_data,
            pagination,
            keyword.as_deref(),
        ),
    )
    .await?;
    Ok(warp::reply::json(&attributes))
}

async fn table_data(
    body: TableDataBody,
    context: Arc<TablegateContext>,
    timeout: Duration,
) -> Result<impl Reply, ApiError> {
    let table = context.resolve_table(&body.table_name, body.schema_name.as_deref())?;
    let pagination = pagination(body.page, body.page_size, context.default_page_size)?;
    let keyword = non_empty(body.keyword);
    debug!("Fetching {table} with {} filter(s)", body.query.len());

    let rows = with_timeout(
        timeout,
        context.get_table_data(&table, body.query, pagination, keyword.as_deref()),
    )
    .await?;
    Ok(warp::reply::json(&rows))
}

async fn table_record(
    body: TableRecordBody,
    context: Arc<TablegateContext>,
    timeout: Duration,
) -> Result<impl Reply, ApiError> {
    let table = context.resolve_table(&body.table_name, body.schema_name.as_deref())?;
    let custom_column = non_empty(body.custom_column);

    let record = with_timeout(
        timeout,
        context.get_table_data_by_id(&table, body.id, body.ids, custom_column.as_deref()),
    )
    .await?;
    Ok(warp::reply::json(&record))
}

async fn create_record(
    body: CreateRecordBody,
    context: Arc<TablegateContext>,
    timeout: Duration,
) -> Result<impl Reply, ApiError> {
    let table = context.resolve_table(&body.table_name, body.schema_name.as_deref())?;
    let primary_key_column = non_empty(body.primary_key_column);

    let created = with_timeout(
        timeout,
        context.create_table_record(
            &table,
            body.data,
            body.return_id,
            primary_key_column.as_deref(),
        ),
    )
    .await?;
    Ok(warp::reply::json(&created))
}

pub fn filters(
    context: Arc<TablegateContext>,
    config: HttpFrontend,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let timeout = Duration::from_millis(config.request_timeout_ms);
    let with_context = warp::any()
        .map(move || (context.clone(), timeout))
        .untuple_one();

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["Authorization", "Content-Type"])
        .allow_methods(vec!["GET", "POST", "PUT"]);

    let primary_key_route = warp::path!("primary-key" / String)
        .and(warp::get())
        .and(warp::query::<TableParams>())
        .and(with_context.clone())
        .then(primary_key)
        .map(into_response);

    let columns_route = warp::path!("columns" / String)
        .and(warp::get())
        .and(warp::query::<ColumnsParams>())
        .and(with_context.clone())
        .then(columns)
        .map(into_response);

    let foreign_keys_route = warp::path!("foreign-keys" / String)
        .and(warp::get())
        .and(warp::query::<TableParams>())
        .and(with_context.clone())
        .then(foreign_keys)
        .map(into_response);

    let attributes_route = warp::path!("attributes" / String)
        .and(warp::get())
        .and(warp::query::<AttributesParams>())
        .and(with_context.clone())
        .then(attributes)
        .map(into_response);

    let table_data_route = warp::path!("data" / "table")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context.clone())
        .then(table_data)
        .map(into_response);

    let table_record_route = warp::path!("data" / "table" / "id")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context.clone())
        .then(table_record)
        .map(into_response);

    let create_record_route = warp::path!("data" / "table")
        .and(warp::put())
        .and(warp::body::json())
        .and(with_context)
        .then(create_record)
        .map(into_response);

    let routes = primary_key_route
        .or(columns_route)
        .unify()
        .or(foreign_keys_route)
        .unify()
        .or(attributes_route)
        .unify()
        .or(table_data_route)
        .unify()
        .or(table_record_route)
        .unify()
        .or(create_record_route)
        .unify();

    instrument()
        .and(routes.recover(handle_rejection).unify())
        .map(with_runtime_header)
        .with(cors)
}

pub async fn run_server(
    context: Arc<TablegateContext>,
    config: HttpFrontend,
    shutdown: impl Future<Output = ()> + Send + 'static,
) {
    let filters = filters(context, config.clone());

    let socket_addr: SocketAddr = format!("{}:{}", config.bind_host, config.bind_port)
        .parse()
        .expect("Error parsing the listen address");
    let (addr, server) = warp::serve(filters).bind_with_graceful_shutdown(socket_addr, shutdown);

    info!("Starting the HTTP frontend on {addr}");
    server.await;
    info!("HTTP frontend stopped");
}
