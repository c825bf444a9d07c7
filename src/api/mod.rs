//! HTTP API Module
//!
//! REST lease server backed by any lease store.

mod http;

pub use http::{ErrorResponse, HealthResponse, LeaseServer};
