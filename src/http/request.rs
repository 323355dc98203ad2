//! Request correlation.
//!
//! # Responsibilities
//! - Assign a request ID, or keep the one the caller sent
//! - Write it back onto the inbound headers and into request extensions
//! - Echo it on every response, error responses included
//! - Open the per-request tracing span carrying the ID
//!
//! # Design Decisions
//! - A present, non-blank `x-request-id` is honored verbatim (trust on first use)
//! - Otherwise a UUID v4 is generated
//! - The layer sits outermost so auth failures are correlated too

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::FromRequestParts;
use axum::http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Request, Response};
use tower::{Layer, Service};
use tower_http::trace::MakeSpan;
use tracing::Span;
use uuid::Uuid;

use crate::http::response::ApiError;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Correlation identifier for one logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId {
    value: String,
    header: HeaderValue,
}

impl RequestId {
    pub fn generate() -> Self {
        let value = Uuid::new_v4().to_string();
        // A hyphenated UUID is plain ASCII, always a valid header value.
        let header = HeaderValue::from_str(&value).expect("uuid is a valid header value");
        Self { value, header }
    }

    /// Reuse the inbound header if present and non-blank, else generate.
    pub fn tag(headers: &HeaderMap) -> Self {
        headers
            .get(&X_REQUEST_ID)
            .and_then(|header| {
                let value = header.to_str().ok()?;
                if value.trim().is_empty() {
                    return None;
                }
                Some(Self {
                    value: value.to_string(),
                    header: header.clone(),
                })
            })
            .unwrap_or_else(Self::generate)
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn header_value(&self) -> HeaderValue {
        self.header.clone()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Access to the request ID stored by [`RequestIdLayer`].
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&RequestId>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&RequestId> {
        self.extensions().get::<RequestId>()
    }
}

impl RequestIdExt for Parts {
    fn request_id(&self) -> Option<&RequestId> {
        self.extensions.get::<RequestId>()
    }
}

impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .request_id()
            .cloned()
            .ok_or_else(|| ApiError::internal("request id layer not installed"))
    }
}

/// Tower layer that tags every request with a [`RequestId`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestIdService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let id = RequestId::tag(req.headers());
        req.headers_mut().insert(X_REQUEST_ID, id.header_value());
        req.extensions_mut().insert(id.clone());

        let fut = self.inner.call(req);
        Box::pin(async move {
            let mut response = fut.await?;
            response.headers_mut().insert(X_REQUEST_ID, id.header_value());
            Ok(response)
        })
    }
}

/// Span factory for `TraceLayer`: every event inside the request carries
/// `request_id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSpan;

impl<B> MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .request_id()
            .map(|id| id.as_str().to_string())
            .unwrap_or_default();

        tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %request.method(),
            path = %request.uri().path(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use std::convert::Infallible;
    use tower::ServiceExt;

    /// Inner service that answers with the request ID it observed.
    async fn echo(req: Request<Body>) -> Result<Response<Body>, Infallible> {
        let seen_header = req
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let seen_ext = req.request_id().map(|id| id.to_string()).unwrap_or_default();
        assert_eq!(seen_header, seen_ext);
        Ok(Response::new(Body::from(seen_header)))
    }

    async fn body_string(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_generates_id_when_absent() {
        let svc = RequestIdLayer.layer(tower::service_fn(echo));
        let response = svc
            .oneshot(Request::builder().uri("/x").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let echoed = response
            .headers()
            .get(X_REQUEST_ID)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(!echoed.is_empty());
        assert!(Uuid::parse_str(&echoed).is_ok());
        assert_eq!(body_string(response).await, echoed);
    }

    #[tokio::test]
    async fn test_preserves_existing_id() {
        let svc = RequestIdLayer.layer(tower::service_fn(echo));
        let response = svc
            .oneshot(
                Request::builder()
                    .uri("/x")
                    .header("x-request-id", "client-trace-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get(X_REQUEST_ID).unwrap(), "client-trace-42");
        assert_eq!(body_string(response).await, "client-trace-42");
    }

    #[tokio::test]
    async fn test_blank_id_is_replaced() {
        let svc = RequestIdLayer.layer(tower::service_fn(echo));
        let response = svc
            .oneshot(
                Request::builder()
                    .uri("/x")
                    .header("x-request-id", "   ")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let echoed = response.headers().get(X_REQUEST_ID).unwrap().to_str().unwrap();
        assert!(Uuid::parse_str(echoed).is_ok());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(RequestId::generate(), RequestId::generate());
    }
}
