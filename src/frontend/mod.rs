pub mod http;
pub mod http_utils;
pub mod timing;
pub use self::timing::{instrument, with_runtime_header};
