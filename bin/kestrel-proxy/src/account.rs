//! Account resource handlers
//!
//! Each handler checks the request context and authorization hook, then
//! makes one backend call:
//!
//! | Verb   | Backend call     | Notes                                    |
//! |--------|------------------|------------------------------------------|
//! | GET    | `get_account`    | listing options forwarded, body streamed |
//! | HEAD   | `head_account`   | headers only                             |
//! | PUT    | `put_account`    | stamped with `X-Timestamp`               |
//! | POST   | `post_account`   | stamped with `X-Timestamp`               |
//! | DELETE | `delete_account` | stamped with `X-Timestamp`               |
//!
//! A missing context answers `500`, a refusing hook answers `401`. Both are
//! decided before the request is parsed any further. Backend statuses are
//! relayed unchanged. With autocreate on, a POST to a missing account
//! creates it and is sent once more.

use crate::AppState;
use crate::context::{AuthRequest, ProxyContext};
use axum::{
    Extension,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use kestrel_common::{AccountName, Error, ListingOptions, Timestamp};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// `Allow` header sent when account management is disabled. The switch
/// only turns off PUT and DELETE; the read verbs and the metadata POST
/// stay routed.
const READ_ONLY_METHODS: &str = "GET, HEAD, POST";

/// Response with a short body naming the status.
///
/// Statuses that forbid a body get an empty one.
pub fn standard_response(status: StatusCode) -> Response {
    let body = if status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        Body::empty()
    } else {
        Body::from(status.canonical_reason().unwrap_or("Unknown").to_string())
    };
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

fn text_response(status: StatusCode, text: String) -> Response {
    let mut response = Response::new(Body::from(text));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Request refused by the proxy before any backend call
#[derive(Debug)]
pub struct Rejection(Error);

impl From<Error> for Rejection {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = match &self.0 {
            Error::InvalidAccountName(e) => text_response(status, e.to_string()),
            _ => standard_response(status),
        };
        if matches!(self.0, Error::MethodNotAllowed(_)) {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static(READ_ONLY_METHODS));
        }
        response
    }
}

type HandlerResult = Result<Response, Rejection>;

/// Response carrying backend headers and status
fn relay(status: StatusCode, headers: HeaderMap, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Context and authorization gate shared by every verb
fn gate(
    context: Option<&ProxyContext>,
    method: &Method,
    uri: &Uri,
    account: &str,
    headers: &HeaderMap,
) -> Result<(), Error> {
    let Some(context) = context else {
        error!("No proxy context on {} {}", method, uri);
        return Err(Error::internal(format!("no proxy context on {method} {uri}")));
    };
    let request = AuthRequest {
        method,
        uri,
        account,
        headers,
    };
    if !context.is_authorized(&request) {
        info!("Denied {} on account {}", method, account);
        return Err(Error::Unauthorized);
    }
    Ok(())
}

/// Reject names longer than the configured limit
fn check_account_name(state: &AppState, account: String) -> Result<AccountName, Error> {
    Ok(AccountName::with_max_len(
        account,
        state.settings.max_account_name_length,
    )?)
}

fn check_management_allowed(state: &AppState, method: &Method) -> Result<(), Error> {
    if state.settings.allow_account_management {
        Ok(())
    } else {
        Err(Error::MethodNotAllowed(method.to_string()))
    }
}

/// Listing options from the query string
fn listing_options(uri: &Uri) -> Result<ListingOptions, Error> {
    Query::<ListingOptions>::try_from_uri(uri)
        .map(|Query(options)| options)
        .map_err(|e| Error::invalid_request(e.body_text()))
}

/// Stamp the request with the time used for backend conflict resolution
fn stamp_timestamp(headers: &mut HeaderMap) {
    let now = Timestamp::now().to_string();
    if let Ok(value) = HeaderValue::from_str(&now) {
        headers.insert(HeaderName::from_static("x-timestamp"), value);
    }
}

/// Empty account answered when the backend has none and autocreate is on
fn autocreated_account() -> Response {
    let mut headers = HeaderMap::new();
    let now = Timestamp::now().to_string();
    let fields = [
        ("content-length", "0"),
        ("accept-ranges", "bytes"),
        ("content-type", "text/plain; charset=utf-8"),
        ("x-timestamp", now.as_str()),
        ("x-account-bytes-used", "0"),
        ("x-account-container-count", "0"),
        ("x-account-object-count", "0"),
    ];
    for (name, value) in fields {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    relay(StatusCode::NO_CONTENT, headers, Body::empty())
}

/// Create a missing account ahead of a retried request.
///
/// Returns `true` when the account now exists. A conflict means another
/// request created it first.
async fn autocreate_account(state: &AppState, account: &AccountName) -> bool {
    let mut headers = HeaderMap::new();
    stamp_timestamp(&mut headers);
    let status = state.client.put_account(account.as_str(), &headers).await;
    if status.is_success() || status == StatusCode::CONFLICT {
        info!("Autocreated account {}", account);
        true
    } else {
        warn!("Could not autocreate account {}: {}", account, status);
        false
    }
}

/// GET /{account} - list the account
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
    context: Option<Extension<ProxyContext>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> HandlerResult {
    gate(context.as_deref(), &method, &uri, &account, &headers)?;
    let account = check_account_name(&state, account)?;
    let options = listing_options(&uri)?;

    debug!("GET account {} {:?}", account, options);
    let backend = state
        .client
        .get_account(account.as_str(), &options, &headers)
        .await;

    if backend.status == StatusCode::NOT_FOUND && state.settings.account_autocreate {
        // Dropping the backend body releases its stream.
        return Ok(autocreated_account());
    }
    Ok(relay(
        backend.status,
        backend.headers,
        backend.body.unwrap_or_else(Body::empty),
    ))
}

/// HEAD /{account} - account headers
pub async fn head_account(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
    context: Option<Extension<ProxyContext>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> HandlerResult {
    gate(context.as_deref(), &method, &uri, &account, &headers)?;
    let account = check_account_name(&state, account)?;

    let backend = state.client.head_account(account.as_str(), &headers).await;
    if backend.status == StatusCode::NOT_FOUND && state.settings.account_autocreate {
        return Ok(autocreated_account());
    }
    Ok(relay(backend.status, backend.headers, Body::empty()))
}

/// PUT /{account} - create the account
pub async fn put_account(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
    context: Option<Extension<ProxyContext>>,
    method: Method,
    uri: Uri,
    mut headers: HeaderMap,
) -> HandlerResult {
    gate(context.as_deref(), &method, &uri, &account, &headers)?;
    check_management_allowed(&state, &method)?;
    let account = check_account_name(&state, account)?;

    stamp_timestamp(&mut headers);
    let status = state.client.put_account(account.as_str(), &headers).await;
    info!("PUT account {}: {}", account, status);
    Ok(standard_response(status))
}

/// POST /{account} - update account metadata
pub async fn post_account(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
    context: Option<Extension<ProxyContext>>,
    method: Method,
    uri: Uri,
    mut headers: HeaderMap,
) -> HandlerResult {
    gate(context.as_deref(), &method, &uri, &account, &headers)?;
    let account = check_account_name(&state, account)?;

    stamp_timestamp(&mut headers);
    let mut status = state.client.post_account(account.as_str(), &headers).await;

    if status == StatusCode::NOT_FOUND
        && state.settings.account_autocreate
        && autocreate_account(&state, &account).await
    {
        // The retry must not lose to the creation timestamp.
        stamp_timestamp(&mut headers);
        status = state.client.post_account(account.as_str(), &headers).await;
    }
    Ok(standard_response(status))
}

/// DELETE /{account} - delete the account
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
    context: Option<Extension<ProxyContext>>,
    method: Method,
    uri: Uri,
    mut headers: HeaderMap,
) -> HandlerResult {
    gate(context.as_deref(), &method, &uri, &account, &headers)?;
    // A query string here is most likely a typo for a middleware request.
    if uri.query().is_some_and(|q| !q.is_empty()) {
        return Err(Error::invalid_request("DELETE on an account takes no query string").into());
    }
    check_management_allowed(&state, &method)?;

    stamp_timestamp(&mut headers);
    let status = state.client.delete_account(&account, &headers).await;
    info!("DELETE account {}: {}", account, status);
    Ok(standard_response(status))
}
