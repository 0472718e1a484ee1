//! Authentication collaborator interface and the request identity gate.
//!
//! The gate never rejects a request by itself: it resolves credentials into
//! an [`Identity`] (or nothing) and threads the result to the route pipeline,
//! which enforces per-operation visibility.

use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderMap;
use serde_json::Value;

/// A resolved session/user pair. Both values are opaque to crudkit; they are
/// handed to application handlers unchanged.
#[derive(Debug, Clone)]
pub struct Identity {
    pub session: Value,
    pub user: Value,
}

/// The authentication provider consumed by the application root.
///
/// Implementations inspect the inbound request headers and return the
/// resolved identity, or `None` when credentials are absent or invalid.
/// Resolution failures must not reject the request here; unauthenticated
/// access to public operations is legal.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn resolve(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// Null provider: every request is anonymous. Protected operations on an app
/// using this provider always answer 401.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAnonymous;

#[async_trait]
impl Authenticator for AllowAnonymous {
    async fn resolve(&self, _headers: &HeaderMap) -> Option<Identity> {
        None
    }
}

/// Request extension carrying the gate's result to the generated route
/// handlers. Always inserted, so downstream extraction is infallible.
#[derive(Debug, Clone, Default)]
pub struct CurrentIdentity(pub Option<Arc<Identity>>);
