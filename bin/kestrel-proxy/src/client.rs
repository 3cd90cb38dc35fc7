//! Backend account-server client
//!
//! The handlers talk to the account tier only through [`AccountClient`].
//! Every call reports the backend's HTTP status; transport failures are
//! folded into a status code by the implementation, so handlers never see
//! an error value.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use kestrel_common::{Error, ListingOptions};
use std::time::Duration;
use tracing::{debug, warn};

/// Result of an account GET
pub struct GetAccountResponse {
    /// Listing body, streamed from the backend. Dropping it releases the
    /// backend connection.
    pub body: Option<Body>,
    pub headers: HeaderMap,
    pub status: StatusCode,
}

/// Result of an account HEAD
pub struct HeadAccountResponse {
    pub headers: HeaderMap,
    pub status: StatusCode,
}

/// Account operations offered by the account tier
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Read an account, listing its containers
    async fn get_account(
        &self,
        account: &str,
        options: &ListingOptions,
        headers: &HeaderMap,
    ) -> GetAccountResponse;

    /// Read account headers only
    async fn head_account(&self, account: &str, headers: &HeaderMap) -> HeadAccountResponse;

    /// Create an account
    async fn put_account(&self, account: &str, headers: &HeaderMap) -> StatusCode;

    /// Update account metadata
    async fn post_account(&self, account: &str, headers: &HeaderMap) -> StatusCode;

    /// Delete an account
    async fn delete_account(&self, account: &str, headers: &HeaderMap) -> StatusCode;
}

/// Connection-level headers that never cross the proxy
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Copy `headers` without hop-by-hop entries
fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Map a transport failure to the status reported to the client
fn status_for(err: &Error) -> StatusCode {
    StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
}

/// [`AccountClient`] that forwards to a single account server over HTTP
pub struct HttpAccountClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpAccountClient {
    /// Create a client for the account server at `endpoint`
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> kestrel_common::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, account: &str) -> String {
        format!("{}/{}", self.endpoint, urlencoding::encode(account))
    }

    async fn send(
        &self,
        method: Method,
        account: &str,
        query: &[(&str, &str)],
        headers: &HeaderMap,
    ) -> Result<reqwest::Response, Error> {
        let mut forwarded = end_to_end(headers);
        forwarded.remove(axum::http::header::CONTENT_LENGTH);

        let url = self.url(account);
        debug!("{} {}", method, url);

        let mut request = self.http.request(method, &url).headers(forwarded);
        if !query.is_empty() {
            request = request.query(query);
        }

        request.send().await.map_err(|e| {
            warn!("Account server request to {} failed: {}", url, e);
            if e.is_timeout() {
                Error::Timeout
            } else if e.is_connect() {
                Error::ConnectionFailed(e.to_string())
            } else {
                Error::ServiceUnavailable(e.to_string())
            }
        })
    }

    async fn status_only(&self, method: Method, account: &str, headers: &HeaderMap) -> StatusCode {
        match self.send(method, account, &[], headers).await {
            Ok(resp) => resp.status(),
            Err(e) => status_for(&e),
        }
    }
}

#[async_trait]
impl AccountClient for HttpAccountClient {
    async fn get_account(
        &self,
        account: &str,
        options: &ListingOptions,
        headers: &HeaderMap,
    ) -> GetAccountResponse {
        match self
            .send(Method::GET, account, &options.to_pairs(), headers)
            .await
        {
            Ok(resp) => GetAccountResponse {
                status: resp.status(),
                headers: end_to_end(resp.headers()),
                body: Some(Body::from_stream(resp.bytes_stream())),
            },
            Err(e) => GetAccountResponse {
                body: None,
                headers: HeaderMap::new(),
                status: status_for(&e),
            },
        }
    }

    async fn head_account(&self, account: &str, headers: &HeaderMap) -> HeadAccountResponse {
        match self.send(Method::HEAD, account, &[], headers).await {
            Ok(resp) => HeadAccountResponse {
                status: resp.status(),
                headers: end_to_end(resp.headers()),
            },
            Err(e) => HeadAccountResponse {
                headers: HeaderMap::new(),
                status: status_for(&e),
            },
        }
    }

    async fn put_account(&self, account: &str, headers: &HeaderMap) -> StatusCode {
        self.status_only(Method::PUT, account, headers).await
    }

    async fn post_account(&self, account: &str, headers: &HeaderMap) -> StatusCode {
        self.status_only(Method::POST, account, headers).await
    }

    async fn delete_account(&self, account: &str, headers: &HeaderMap) -> StatusCode {
        self.status_only(Method::DELETE, account, headers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, RawQuery};
    use axum::http::HeaderValue;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use tokio::net::TcpListener;

    /// Fake account server echoing what it received
    async fn spawn_account_server() -> String {
        async fn listing(
            Path(account): Path<String>,
            RawQuery(query): RawQuery,
            headers: HeaderMap,
        ) -> impl IntoResponse {
            let timestamp = headers
                .get("x-timestamp")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none")
                .to_string();
            (
                StatusCode::OK,
                [
                    ("x-account-container-count", "2".to_string()),
                    ("x-seen-timestamp", timestamp),
                ],
                format!("{account}?{}", query.unwrap_or_default()),
            )
        }

        async fn created() -> StatusCode {
            StatusCode::CREATED
        }

        async fn missing() -> StatusCode {
            StatusCode::NOT_FOUND
        }

        let app = Router::new().route(
            "/{account}",
            get(listing)
                .put(created)
                .post(created)
                .delete(missing),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_end_to_end_strips_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("close"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("host", HeaderValue::from_static("proxy"));
        headers.insert("x-auth-token", HeaderValue::from_static("t"));
        headers.append("x-multi", HeaderValue::from_static("1"));
        headers.append("x-multi", HeaderValue::from_static("2"));

        let out = end_to_end(&headers);
        assert!(out.get("connection").is_none());
        assert!(out.get("transfer-encoding").is_none());
        assert!(out.get("host").is_none());
        assert_eq!(out.get("x-auth-token").unwrap(), "t");
        assert_eq!(out.get_all("x-multi").iter().count(), 2);
    }

    #[tokio::test]
    async fn test_get_streams_listing_and_headers() {
        let endpoint = spawn_account_server().await;
        let client = HttpAccountClient::new(endpoint, Duration::from_secs(5)).unwrap();

        let options = ListingOptions {
            format: Some("json".into()),
            limit: Some("2".into()),
            ..Default::default()
        };
        let resp = client
            .get_account("AUTH_test", &options, &HeaderMap::new())
            .await;

        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.headers.get("x-account-container-count").unwrap(), "2");
        let body = resp.body.unwrap().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"AUTH_test?format=json&limit=2");
    }

    #[tokio::test]
    async fn test_forwards_request_headers() {
        let endpoint = spawn_account_server().await;
        let client = HttpAccountClient::new(endpoint, Duration::from_secs(5)).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", HeaderValue::from_static("0000000001.00000"));
        let resp = client.head_account("AUTH_test", &headers).await;

        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(
            resp.headers.get("x-seen-timestamp").unwrap(),
            "0000000001.00000"
        );
    }

    #[tokio::test]
    async fn test_mutations_relay_status() {
        let endpoint = spawn_account_server().await;
        let client = HttpAccountClient::new(endpoint, Duration::from_secs(5)).unwrap();
        let headers = HeaderMap::new();

        assert_eq!(
            client.put_account("AUTH_test", &headers).await,
            StatusCode::CREATED
        );
        assert_eq!(
            client.post_account("AUTH_test", &headers).await,
            StatusCode::CREATED
        );
        assert_eq!(
            client.delete_account("AUTH_test", &headers).await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_service_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            HttpAccountClient::new(format!("http://{addr}/"), Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.put_account("AUTH_test", &HeaderMap::new()).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        let resp = client
            .get_account("AUTH_test", &ListingOptions::default(), &HeaderMap::new())
            .await;
        assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(resp.body.is_none());
    }
}
