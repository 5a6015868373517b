//! # Data Retrieval Module
//!
//! Generic HTTP plumbing shared by the WebGIS clients. Everything specific to
//! the Linz endpoints (headers, paths, token handling) lives in
//! [`crate::webgis`]; this module only knows how to send a request against a
//! base URL and hand back a decoded [`ky_http::ApiResponse`].

/// HTTP `ApiClient` built on `reqwest` and `reqwest-middleware`.
pub mod ky_http;
