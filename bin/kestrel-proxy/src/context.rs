//! Per-request proxy context
//!
//! Handlers do not look the authorization hook up from global state. A
//! middleware layer places a [`ProxyContext`] into the request extensions
//! and handlers read it from there. A request that reaches a handler
//! without one was routed through a misconfigured stack.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, Uri},
    middleware::Next,
    response::Response,
};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// What an authorization hook gets to see
#[derive(Debug)]
pub struct AuthRequest<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub account: &'a str,
    pub headers: &'a HeaderMap,
}

/// Authorization hook consulted before any backend call
pub trait Authorize: Send + Sync {
    /// Return `true` to let the request through
    fn authorize(&self, request: &AuthRequest<'_>) -> bool;
}

impl<F> Authorize for F
where
    F: Fn(&AuthRequest<'_>) -> bool + Send + Sync,
{
    fn authorize(&self, request: &AuthRequest<'_>) -> bool {
        self(request)
    }
}

/// Refuses a fixed set of accounts
#[derive(Debug, Default)]
pub struct AccountDenyList {
    denied: HashSet<String>,
}

impl AccountDenyList {
    pub fn new<I, S>(accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            denied: accounts.into_iter().map(Into::into).collect(),
        }
    }
}

impl Authorize for AccountDenyList {
    fn authorize(&self, request: &AuthRequest<'_>) -> bool {
        let allowed = !self.denied.contains(request.account);
        if !allowed {
            debug!("Account {} is on the deny list", request.account);
        }
        allowed
    }
}

/// Context attached to every proxied request
#[derive(Clone, Default)]
pub struct ProxyContext {
    authorize: Option<Arc<dyn Authorize>>,
}

impl ProxyContext {
    /// Context without an authorization hook; every request is allowed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context consulting `hook` before dispatch
    #[must_use]
    pub fn with_authorizer(hook: Arc<dyn Authorize>) -> Self {
        Self {
            authorize: Some(hook),
        }
    }

    /// True when no hook is configured or the hook approves
    #[must_use]
    pub fn is_authorized(&self, request: &AuthRequest<'_>) -> bool {
        self.authorize
            .as_ref()
            .is_none_or(|hook| hook.authorize(request))
    }
}

impl fmt::Debug for ProxyContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyContext")
            .field("authorize", &self.authorize.is_some())
            .finish()
    }
}

/// Middleware inserting the proxy context into request extensions
pub async fn context_layer(
    State(context): State<ProxyContext>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(context);
    next.run(request).await
}
