//! HTTP surface: the browser page and the JSON API behind it.

pub mod routes;

pub use routes::{AppState, app_routes};
