// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State as AxumState,
    http::{HeaderValue, Method, header},
    response::{IntoResponse, Response},
    routing::post,
};
use futures::StreamExt;
use serde_json::{Value, json};

use super::error::json_error_middleware;
use super::{RouteDoc, State};
use crate::dispatcher::TokenStream;
use crate::error::GatewayError;
use crate::protocols::{
    BatchEnvelope, CompletionRequest, CustomItem, ImageItem, ImageStreamItem, ItemBody,
    ItemFailure, ItemResult, MalformedItem, TextStreamItem, parse_complete_item,
};

/// Indices of `/complete` items that were not served because another item in the same
/// batch took the streaming path
pub const SKIPPED_INDICES_HEADER: &str = "x-prism-skipped-indices";

const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

pub fn completion_router(state: Arc<State>) -> (Vec<RouteDoc>, Router) {
    let docs: Vec<RouteDoc> = [
        "/complete",
        "/complete_stream",
        "/complete_image",
        "/complete_image_stream",
        "/complete_custom",
    ]
    .into_iter()
    .map(|path| RouteDoc::new(Method::POST, path))
    .collect();

    let router = Router::new()
        .route("/complete", post(complete_handler))
        .route("/complete_stream", post(complete_stream_handler))
        .route("/complete_image", post(complete_image_handler))
        .route("/complete_image_stream", post(complete_image_stream_handler))
        .route("/complete_custom", post(complete_custom_handler))
        .layer(axum::middleware::from_fn(json_error_middleware))
        .with_state(state);

    (docs, router)
}

async fn complete_handler(
    AxumState(state): AxumState<Arc<State>>,
    Json(envelope): Json<BatchEnvelope<Value>>,
) -> Response {
    // parse failures keep their slot so the response follows input order
    let mut parsed: Vec<Result<CompletionRequest, ItemResult>> =
        Vec::with_capacity(envelope.data.len());
    for item in envelope.data {
        match parse_complete_item(item, state.text_system_prompt()) {
            Ok(request) => parsed.push(Ok(request)),
            Err(err @ MalformedItem { index: None, .. }) => {
                return GatewayError::from(err).into_response();
            }
            Err(err @ MalformedItem { index: Some(index), .. }) => {
                let err = GatewayError::from(err);
                tracing::warn!(index, %err, "malformed request item");
                parsed.push(Err(ItemResult::failed(index, ItemFailure::from(&err))));
            }
        }
    }

    if let Some(position) = parsed
        .iter()
        .position(|item| matches!(item, Ok(request) if request.stream))
    {
        let Ok(request) = parsed.remove(position) else {
            unreachable!("position matched a parsed request");
        };
        let skipped: Vec<i64> = parsed
            .iter()
            .map(|item| match item {
                Ok(request) => request.index,
                Err(result) => result.index(),
            })
            .collect();
        if !skipped.is_empty() {
            tracing::warn!(
                index = request.index,
                ?skipped,
                "batch contains a streaming item; only that item is served"
            );
        }
        return match state.router().route_stream(request).await {
            Ok(stream) => text_stream_response(stream, &skipped),
            Err(err) => err.into_response(),
        };
    }

    let mut requests = Vec::with_capacity(parsed.len());
    let mut slots: Vec<Option<ItemResult>> = Vec::with_capacity(parsed.len());
    for item in parsed {
        match item {
            Ok(request) => {
                requests.push(request);
                slots.push(None);
            }
            Err(failed) => slots.push(Some(failed)),
        }
    }
    let mut routed = state.router().route(requests).await.into_iter();

    let results: Vec<ItemResult> = slots
        .into_iter()
        .filter_map(|slot| slot.or_else(|| routed.next()))
        .collect();

    Json(BatchEnvelope::new(results)).into_response()
}

async fn complete_stream_handler(
    AxumState(state): AxumState<Arc<State>>,
    Json(envelope): Json<BatchEnvelope<TextStreamItem>>,
) -> Response {
    stream_first(&state, envelope.data).await
}

async fn complete_image_handler(
    AxumState(state): AxumState<Arc<State>>,
    Json(envelope): Json<BatchEnvelope<ImageItem>>,
) -> Response {
    let requests = envelope
        .data
        .into_iter()
        .map(CompletionRequest::from)
        .collect();
    Json(BatchEnvelope::new(state.router().route(requests).await)).into_response()
}

async fn complete_image_stream_handler(
    AxumState(state): AxumState<Arc<State>>,
    Json(envelope): Json<BatchEnvelope<ImageStreamItem>>,
) -> Response {
    stream_first(&state, envelope.data).await
}

/// Deterministic completion with a per-item instruction. Answers `[index, text]` per
/// item, `[index, {"error": ...}]` for failed ones.
async fn complete_custom_handler(
    AxumState(state): AxumState<Arc<State>>,
    Json(envelope): Json<BatchEnvelope<CustomItem>>,
) -> Response {
    let requests = envelope
        .data
        .into_iter()
        .map(CompletionRequest::from)
        .collect();
    let results: Vec<Value> = state
        .router()
        .route(requests)
        .await
        .into_iter()
        .map(|ItemResult(index, body)| match body {
            ItemBody::Completed(output) => json!([index, output.text]),
            ItemBody::Failed { error } => json!([index, { "error": error }]),
        })
        .collect();
    Json(BatchEnvelope::new(results)).into_response()
}

/// The single-item streaming endpoints serve the first item only.
async fn stream_first<T>(state: &State, items: Vec<T>) -> Response
where
    CompletionRequest: From<T>,
{
    let mut items = items.into_iter();
    let Some(first) = items.next() else {
        return GatewayError::from(MalformedItem {
            index: None,
            reason: "`data` must hold one item".to_string(),
        })
        .into_response();
    };
    if items.len() > 0 {
        tracing::warn!(extra = items.len(), "streaming endpoint serves the first item only");
    }

    match state.router().route_stream(CompletionRequest::from(first)).await {
        Ok(stream) => text_stream_response(stream, &[]),
        Err(err) => err.into_response(),
    }
}

fn text_stream_response(stream: TokenStream, skipped: &[i64]) -> Response {
    let body = Body::from_stream(stream.into_text_stream().map(Ok::<_, Infallible>));
    let mut response = ([(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)], body).into_response();

    if !skipped.is_empty() {
        let joined = skipped
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        if let Ok(value) = HeaderValue::from_str(&joined) {
            response.headers_mut().insert(SKIPPED_INDICES_HEADER, value);
        }
    }
    response
}
