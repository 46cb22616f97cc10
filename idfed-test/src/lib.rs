//! Test utilities for idfed services: an in-process [`TestApp`] client.

mod app;

pub use app::{resolve_path, tokenize_path, PathToken, TestApp, TestRequest, TestResponse};
