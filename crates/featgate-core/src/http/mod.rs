//! HTTP transport used to fetch descriptors and artifacts.

mod client;

pub use client::{HttpClient, HttpClientConfig, HttpError, RetryPolicy};
