//! HTTP surface of geoauction: the auction endpoint plus catalog administration.

pub mod rest;

pub use rest::{ApiError, ApiState, RestApi, REQUEST_TIMEOUT_HEADER};
