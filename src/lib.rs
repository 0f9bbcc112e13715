pub mod catalog;
pub mod config;
pub mod context;
pub mod data_types;
#[cfg(feature = "frontend-http")]
pub mod frontend;
pub mod query;
pub mod record;
pub mod repository;
