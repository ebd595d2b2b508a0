//! Yahoo Fantasy API endpoints and payload helpers

pub mod http;
pub mod payload;

pub use http::API_BASE;
