//! The question endpoint — the relay's HTTP face.
//!
//! `POST /question` answers from the cache when possible and otherwise
//! streams the (possibly shared) upstream fetch to the caller chunk by
//! chunk. The status line is committed only after the first tee event, so
//! an upstream that fails before producing anything still gets a clean 500;
//! a failure after bytes went out aborts the connection mid-body instead.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::api::server::AppState;
use crate::relay::{Answer, Subscription, TeeEvent};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    /// The question, verbatim; also the cache key.
    #[serde(default)]
    pub question: String,
}

/// POST /question — answer from cache or stream from upstream.
pub async fn post_question(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuestionRequest>,
) -> Response {
    if request.question.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "question must be a non-empty string" })),
        )
            .into_response();
    }

    match state.relay.answer(&request.question) {
        Answer::Cached(text) => text_response(text),
        Answer::Stream(mut subscription) => match subscription.next_event().await {
            Some(TeeEvent::Fragment(first)) => streamed_response(first, subscription),
            // Zero-fragment upstream: the full text is the empty concatenation.
            Some(TeeEvent::Completed(full)) => text_response(full),
            Some(TeeEvent::Failed(error)) => {
                error!(%error, "upstream failed before any bytes were sent");
                internal_error()
            }
            None => internal_error(),
        },
    }
}

fn text_response(text: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, TEXT_PLAIN)], text).into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Internal Server Error" })),
    )
        .into_response()
}

/// Stream the remaining tee events as a chunked body, starting with the
/// fragment already received.
///
/// A mid-stream failure is surfaced by erroring the body stream, which
/// tears the connection down without a clean end — the truncated response
/// is the caller's failure signal.
fn streamed_response(first: String, subscription: Subscription) -> Response {
    let rest = stream::unfold(subscription, |mut sub| async move {
        match sub.next_event().await {
            Some(TeeEvent::Fragment(fragment)) => Some((Ok(Bytes::from(fragment)), sub)),
            Some(TeeEvent::Completed(_)) | None => None,
            Some(TeeEvent::Failed(error)) => Some((Err(error), sub)),
        }
    });
    let body = stream::once(async move { Ok(Bytes::from(first)) }).chain(rest);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, TEXT_PLAIN)],
        Body::from_stream(body),
    )
        .into_response()
}
