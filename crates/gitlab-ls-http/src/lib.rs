//! HTTP plumbing for gitlab-ls
//!
//! Provides a mockable HTTP client wrapper used by the GitLab source client,
//! plus the backoff policy the refresh cycles use between failed attempts.
//!
//! ## Features
//!
//! - **Trait-based design**: Mockable via `HttpClientTrait`
//! - **Configurable**: Timeouts and user-agent
//! - **Typed failures**: HTTP status errors carry the `Retry-After` hint
//! - **Backoff**: Exponential, capped, jittered and non-decreasing

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;

pub use backoff::{Backoff, BackoffPolicy, Jitter};
pub use client::{shared_client, HttpClient, HttpClientTrait};
pub use config::HttpConfig;
pub use error::{HttpError, Result};

/// Re-export commonly used types
pub use reqwest::{header, Method, Response, StatusCode};
