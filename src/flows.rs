//! Grant configurations producing token sources and authorized clients.
//!
//! - [`Config`]: three-legged flow. Builds consent URLs, exchanges codes, and keeps a session
//!   alive through a cached [`TokenRefresher`](crate::source::TokenRefresher).
//! - [`ClientCredentials`]: two-legged flow for service principals.
//!
//! Both are plain serde values, so deployments can load them from configuration files.

mod authorization_code;
mod client_credentials;

pub use authorization_code::*;
pub use client_credentials::*;
