// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use axum::http::StatusCode;

use crate::commands::PromptCommand;
use crate::dispatcher::DispatchError;
use crate::preprocessor::media::ResolutionError;
use crate::protocols::{ItemFailure, MalformedItem, ValidationError};

/// Every way a single request item can fail.
///
/// Item-scoped: in a batch the failure fills that item's result slot and siblings carry
/// on. Each variant has a stable [`GatewayError::kind`] name and an HTTP status used when
/// the failure is the whole response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("`{0}` is a chat command and is not sent to the model")]
    CommandIntercepted(PromptCommand),

    #[error(transparent)]
    Malformed(#[from] MalformedItem),

    #[error("failed to encode the resolved image: {0}")]
    Encode(String),
}

impl From<ValidationError> for GatewayError {
    fn from(err: ValidationError) -> Self {
        GatewayError::Dispatch(DispatchError::Validation(err))
    }
}

impl GatewayError {
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Resolution(e) => match e {
                ResolutionError::Fetch(_) => "FetchError",
                ResolutionError::Decode(_) => "DecodeError",
                ResolutionError::UnsupportedFormat { .. } => "UnsupportedFormatError",
                ResolutionError::PageOutOfRange { .. } => "PageOutOfRangeError",
                ResolutionError::Render(_) => "RenderError",
            },
            GatewayError::Dispatch(e) => match e {
                DispatchError::Validation(_) => "ValidationError",
                DispatchError::ModelInference(_) => "ModelInferenceError",
                DispatchError::ConcurrentStream => "ConcurrentStreamError",
                DispatchError::StreamTimeout => "StreamTimeoutError",
                DispatchError::Cancelled => "CancelledError",
            },
            GatewayError::CommandIntercepted(_) => "CommandInterceptedError",
            GatewayError::Malformed(_) => "MalformedRequestError",
            GatewayError::Encode(_) => "EncodeError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Resolution(e) => match e {
                ResolutionError::Fetch(_) => StatusCode::BAD_GATEWAY,
                ResolutionError::Decode(_) | ResolutionError::PageOutOfRange { .. } => {
                    StatusCode::BAD_REQUEST
                }
                ResolutionError::UnsupportedFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ResolutionError::Render(_) => StatusCode::UNPROCESSABLE_ENTITY,
            },
            GatewayError::Dispatch(e) => match e {
                DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
                DispatchError::ModelInference(_) => StatusCode::INTERNAL_SERVER_ERROR,
                DispatchError::ConcurrentStream => StatusCode::CONFLICT,
                DispatchError::StreamTimeout => StatusCode::GATEWAY_TIMEOUT,
                DispatchError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            },
            GatewayError::CommandIntercepted(_) | GatewayError::Malformed(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&GatewayError> for ItemFailure {
    fn from(err: &GatewayError) -> Self {
        ItemFailure {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}
