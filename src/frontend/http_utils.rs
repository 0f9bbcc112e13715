// Warp error handling and propagation
// Courtesy of https://github.com/seanmonstar/warp/pull/909#issuecomment-1184854848
//
// Usage:
//
//   1) A handler function, instead of returning a Warp reply/rejection, returns a
//   `Result<Reply, ApiError>.`
//
//   Rejections are meant to say "this filter can't handle this request, but maybe
//   some other can" (see https://github.com/seanmonstar/warp/issues/388#issuecomment-576453485).
//   An error in our handlers is final, and we want `?` to bail out of them.
//
//   2) ApiError knows how to convert itself to an HTTP response + status code, so it
//   implements Reply.
//
//   3) We can't implement Reply for Result<Reply, Reply>, so `into_response` converts
//   the handler's Result into a Response:
//
//   ```
//   .then(my_handler_func)
//   .map(into_response)
//   ```
//

use std::convert::Infallible;

use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use warp::filters::body::BodyDeserializeError;
use warp::hyper::{Body, Response, StatusCode};
use warp::reject::{InvalidQuery, MethodNotAllowed, UnsupportedMediaType};
use warp::{Rejection, Reply};

use crate::catalog::CatalogError;
use crate::repository::RepositoryError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Request timed out")]
    Timeout,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Catalog(CatalogError::Validation { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Catalog(
                CatalogError::TableDoesNotExist { .. } | CatalogError::RecordNotFound { .. },
            ) => StatusCode::NOT_FOUND,
            ApiError::Catalog(CatalogError::Repository(e)) => match e {
                RepositoryError::UniqueConstraintViolation(_)
                | RepositoryError::FKConstraintViolation(_)
                | RepositoryError::NotNullViolation(_) => StatusCode::CONFLICT,
                RepositoryError::UndefinedTable(_) => StatusCode::NOT_FOUND,
                RepositoryError::SqlxError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response<Body> {
    if status.is_server_error() {
        error!("Request failed: {message}");
    } else {
        warn!("Request rejected ({status}): {message}");
    }

    warp::reply::with_status(warp::reply::json(&json!({ "error": message })), status)
        .into_response()
}

impl Reply for ApiError {
    fn into_response(self) -> Response<Body> {
        error_response(self.status_code(), self.to_string())
    }
}

/// Turn rejections (unmatched routes, undecodable bodies or query strings) into the
/// same JSON error body handlers return
pub async fn handle_rejection(rejection: Rejection) -> Result<Response<Body>, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = rejection.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = rejection.find::<InvalidQuery>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if let Some(e) = rejection.find::<UnsupportedMediaType>() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string())
    } else if let Some(e) = rejection.find::<MethodNotAllowed>() {
        (StatusCode::METHOD_NOT_ALLOWED, e.to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unhandled rejection: {rejection:?}"),
        )
    };

    Ok(error_response(status, message))
}

pub fn into_response<S: Reply, E: Reply>(reply_res: Result<S, E>) -> Response<Body> {
    match reply_res {
        Ok(resp) => resp.into_response(),
        Err(err) => err.into_response(),
    }
}
