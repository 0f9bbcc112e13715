use std::time::Instant;

use warp::hyper::{Body, Response};
use warp::{Filter, Reply};

pub const RUNTIME_HEADER: &str = "X-Runtime";

pub fn instrument() -> impl Filter<Extract = (Instant,), Error = std::convert::Infallible> + Copy
{
    warp::any().map(Instant::now)
}

pub fn with_runtime_header(start_time: Instant, reply: Response<Body>) -> Response<Body> {
    let elapsed = start_time.elapsed();
    warp::reply::with_header(reply, RUNTIME_HEADER, format!("{elapsed:?}")).into_response()
}
