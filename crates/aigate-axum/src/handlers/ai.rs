//! AI endpoint handlers.
//!
//! All three endpoints share one flow: resolve the caller's origin, run
//! the core admission pipeline, dispatch to the backend, then answer with
//! either a JSON body or an NDJSON stream.

use std::net::SocketAddr;

use aigate_core::{EndpointKind, GatewayError, InferenceOutput, RequestHead, ValidationError};
use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;
use tracing::{debug, info};

use crate::dto::CompletionDto;
use crate::error::HttpError;
use crate::origin::client_origin;
use crate::state::AppState;
use crate::stream::NdjsonStreamWriter;

/// `POST /chat`
pub async fn chat(State(state): State<AppState>, req: Request) -> Result<Response, HttpError> {
    handle(EndpointKind::Chat, &state, req).await
}

/// `POST /vision`
pub async fn vision(State(state): State<AppState>, req: Request) -> Result<Response, HttpError> {
    handle(EndpointKind::Vision, &state, req).await
}

/// `POST /speech`
pub async fn speech(State(state): State<AppState>, req: Request) -> Result<Response, HttpError> {
    handle(EndpointKind::Speech, &state, req).await
}

async fn handle(
    kind: EndpointKind,
    state: &AppState,
    req: Request,
) -> Result<Response, HttpError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let (parts, body) = req.into_parts();

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let origin = client_origin(&parts.headers, peer);
    let head = RequestHead {
        method: parts.method.as_str(),
        authorization: parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
        origin: &origin,
    };

    let admitted = state
        .gateway
        .admit(kind, head, read_body(body, state.settings.max_body_bytes))
        .await
        .inspect_err(|e| {
            debug!(
                request_id = %request_id,
                endpoint = %kind,
                origin = %origin,
                status = e.status_code(),
                reason = %e,
                "Request rejected"
            );
        })?;

    info!(
        request_id = %request_id,
        endpoint = %kind,
        subject = %admitted.identity.subject_id,
        origin = %origin,
        stream = admitted.stream,
        "Request admitted"
    );

    let response = match state.gateway.dispatch(&admitted).await? {
        InferenceOutput::Complete(text) => {
            Json(CompletionDto::new(kind, request_id, text)).into_response()
        }
        InferenceOutput::Stream(deltas) => {
            NdjsonStreamWriter::new(deltas, state.settings.stream_idle_timeout())
                .with_request_id(request_id)
                .into_response()
        }
    };
    Ok(response)
}

/// Buffer the body, enforcing the configured ceiling.
async fn read_body(body: Body, limit: usize) -> Result<Bytes, GatewayError> {
    axum::body::to_bytes(body, limit).await.map_err(|err| {
        if exceeds_limit(&err) {
            GatewayError::PayloadTooLarge { limit }
        } else {
            debug!(error = %err, "Failed to read request body");
            GatewayError::ValidationFailed(ValidationError::field("body", "could not be read"))
        }
    })
}

fn exceeds_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = source {
        if current.is::<LengthLimitError>() {
            return true;
        }
        source = current.source();
    }
    false
}
