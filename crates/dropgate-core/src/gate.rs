//! Download gate - the request-handling decision layer
//!
//! Wraps a static content delegate (`ServeDir`) and decides, per request,
//! whether the transfer may happen at all: unknown paths get a fixed 404,
//! files past their quota a fixed 410, and approved GETs are forwarded to
//! the delegate with a header reporting how many downloads are left.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Router;
use tower::util::ServiceExt;
use tower_http::services::ServeDir;
use tracing::debug;

use crate::tracker::AccessTracker;

/// Response header reporting the downloads a file has left after this one.
pub const TIMES_REMAINING_HEADER: &str = "x-times-remaining";

const NOT_FOUND_MESSAGE: &str = "Not Found!";
const GONE_MESSAGE: &str = "File is no longer available for download";
const METHOD_NOT_ALLOWED_MESSAGE: &str = "Method Not Allowed";

/// Gate in front of the static content delegate.
///
/// Owns no counter state of its own; all accounting lives in the
/// [`AccessTracker`] it was built with.
#[derive(Clone)]
pub struct DownloadGate {
    tracker: Arc<AccessTracker>,
    delegate: ServeDir,
}

impl DownloadGate {
    /// Create a gate serving the tracker's root directory.
    pub fn new(tracker: Arc<AccessTracker>) -> Self {
        let delegate = ServeDir::new(tracker.root());
        Self { tracker, delegate }
    }

    /// The tracker backing this gate.
    pub fn tracker(&self) -> &AccessTracker {
        &self.tracker
    }

    /// Block a file from download without consuming a slot.
    ///
    /// Administrative operation, not exposed over the network. Returns
    /// whether the target was a servable file.
    pub fn disallow_access(&self, path: &str) -> bool {
        self.tracker.disallow(path)
    }

    /// Build a router that sends every path and method through the gate.
    pub fn into_router(self) -> Router {
        Router::new().fallback(serve_request).with_state(self)
    }

    /// Decide and answer a single request.
    async fn handle(&self, request: Request) -> Response {
        let path = request.uri().path().to_owned();

        let Some(handle) = self.tracker.lookup_or_create(&path) else {
            return message_response(StatusCode::NOT_FOUND, NOT_FOUND_MESSAGE);
        };

        if handle.is_exhausted() {
            debug!("Denying {}: download quota exhausted", path);
            return message_response(StatusCode::GONE, GONE_MESSAGE);
        }

        if request.method() != Method::GET {
            return method_not_allowed_response();
        }

        // Claim the slot atomically; a concurrent request may have taken the
        // last one between the check above and here.
        let new_count = match handle.try_acquire() {
            Ok(count) => count,
            Err(_) => {
                debug!("Denying {}: lost race for final download slot", path);
                return message_response(StatusCode::GONE, GONE_MESSAGE);
            }
        };
        let remaining = self.tracker.quota() - new_count;

        match self.delegate.clone().oneshot(request).await {
            Ok(mut response) => {
                response.headers_mut().insert(
                    HeaderName::from_static(TIMES_REMAINING_HEADER),
                    HeaderValue::from(remaining),
                );
                response.map(Body::new).into_response()
            }
            Err(infallible) => match infallible {},
        }
    }
}

/// Axum entry point for the gate.
async fn serve_request(State(gate): State<DownloadGate>, request: Request) -> Response {
    gate.handle(request).await
}

fn message_response(status: StatusCode, message: &str) -> Response {
    (status, Html(format!("<center><h1>{}</h1></center>", message))).into_response()
}

fn method_not_allowed_response() -> Response {
    let mut response =
        message_response(StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_ALLOWED_MESSAGE);
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("GET"));
    response
}
