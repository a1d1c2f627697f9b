// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

/// Why an image source could not be turned into a [`super::ResolvedImage`].
///
/// All variants are scoped to the request item that carried the source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolutionError {
    /// The remote source was unreachable or answered with a non-2xx status. Not retried.
    #[error("failed to fetch media: {0}")]
    Fetch(String),

    /// Malformed text encoding or a corrupt image container.
    #[error("failed to decode media: {0}")]
    Decode(String),

    /// The leading bytes match no supported container.
    #[error("unsupported media format (leading bytes: {prefix})")]
    UnsupportedFormat { prefix: String },

    #[error("page {page} is out of range for a document with {page_count} page(s)")]
    PageOutOfRange { page: i64, page_count: usize },

    /// The document parsed but the page could not be rasterized.
    #[error("failed to render document page: {0}")]
    Render(String),
}

impl From<image::ImageError> for ResolutionError {
    fn from(err: image::ImageError) -> Self {
        ResolutionError::Decode(err.to_string())
    }
}

impl From<base64::DecodeError> for ResolutionError {
    fn from(err: base64::DecodeError) -> Self {
        ResolutionError::Decode(format!("invalid base64 payload: {err}"))
    }
}
