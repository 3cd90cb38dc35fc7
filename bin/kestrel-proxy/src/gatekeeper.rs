//! Gatekeeper middleware
//!
//! System metadata headers (`x-account-sysmeta-*` and friends) are set by
//! the storage tier for its own use. Clients may not send them and must
//! not see them, so they are removed from every inbound request and every
//! outbound response.

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderName},
    middleware::Next,
    response::Response,
};
use tracing::debug;

/// Reserved header prefixes, lowercase
const SYSMETA_PREFIXES: [&str; 3] = [
    "x-account-sysmeta-",
    "x-container-sysmeta-",
    "x-object-sysmeta-",
];

/// True for a reserved system metadata header
#[must_use]
pub fn is_sysmeta(name: &HeaderName) -> bool {
    // Header names are stored lowercase.
    let name = name.as_str();
    SYSMETA_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Remove system metadata headers, returning the names removed
pub fn remove_sysmeta(headers: &mut HeaderMap) -> Vec<HeaderName> {
    let removed: Vec<HeaderName> = headers.keys().filter(|n| is_sysmeta(n)).cloned().collect();
    for name in &removed {
        headers.remove(name);
    }
    removed
}

/// Middleware filtering system metadata in both directions
pub async fn gatekeeper_layer(mut request: Request<Body>, next: Next) -> Response {
    let removed = remove_sysmeta(request.headers_mut());
    if !removed.is_empty() {
        debug!("removed request headers: {:?}", removed);
    }

    let mut response = next.run(request).await;

    let removed = remove_sysmeta(response.headers_mut());
    if !removed.is_empty() {
        debug!("removed response headers: {:?}", removed);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_is_sysmeta() {
        assert!(is_sysmeta(&HeaderName::from_static("x-account-sysmeta-quota")));
        assert!(is_sysmeta(&HeaderName::from_static("x-container-sysmeta-acl")));
        assert!(is_sysmeta(&HeaderName::from_static("x-object-sysmeta-crypto")));
        // Parsing lowercases, so mixed-case input is caught too.
        assert!(is_sysmeta(&HeaderName::from_bytes(b"X-Account-Sysmeta-Quota").unwrap()));
        assert!(!is_sysmeta(&HeaderName::from_static("x-account-meta-color")));
        assert!(!is_sysmeta(&HeaderName::from_static("x-account-sysmeta")));
    }

    #[test]
    fn test_remove_sysmeta() {
        let mut headers = HeaderMap::new();
        headers.insert("x-account-sysmeta-a", HeaderValue::from_static("1"));
        headers.append("x-object-sysmeta-b", HeaderValue::from_static("2"));
        headers.append("x-object-sysmeta-b", HeaderValue::from_static("3"));
        headers.insert("x-account-meta-c", HeaderValue::from_static("4"));

        let mut removed = remove_sysmeta(&mut headers);
        removed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(removed.len(), 2);
        assert_eq!(removed[0], "x-account-sysmeta-a");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("x-account-meta-c").unwrap(), "4");
    }
}
