// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use axum::{
    Json,
    extract::Request,
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::protocols::ItemFailure;

/// Body of every whole-request error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ItemFailure,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        tracing::warn!(kind = self.kind(), error = %self, "request failed");
        (
            self.status_code(),
            Json(ErrorResponse {
                error: ItemFailure::from(&self),
            }),
        )
            .into_response()
    }
}

/// Body-limit and JSON extractor rejections come back as `text/plain`; rewrite them into
/// the [`ErrorResponse`] shape, keeping the status.
pub(super) async fn json_error_middleware(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let status = response.status();
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    if !status.is_client_error() || is_json || status == StatusCode::NOT_FOUND {
        return response;
    }

    let (_parts, body) = response.into_parts();
    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    let message = String::from_utf8_lossy(&body_bytes).to_string();
    (
        status,
        Json(ErrorResponse {
            error: ItemFailure {
                kind: "MalformedRequestError".to_string(),
                message,
            },
        }),
    )
        .into_response()
}
