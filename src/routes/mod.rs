//! Router builders.

pub mod common;
pub mod rest;

pub use common::{common_routes, common_routes_with_ready};
pub use rest::{rest_routes, DEFAULT_BODY_LIMIT};
