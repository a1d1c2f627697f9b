// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use image::{DynamicImage, RgbImage};

use super::{MediaFormat, ResolutionError};
use crate::codec;

// Raw encoded media data (.png, .pdf, ...), optionally b64-encoded
#[derive(Debug)]
pub struct EncodedMediaData {
    pub(crate) bytes: Vec<u8>,
    pub(crate) b64_encoded: bool,
}

impl EncodedMediaData {
    pub fn from_raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            b64_encoded: false,
        }
    }

    // Handles both web URLs (will download the bytes) and data URLs (will keep b64-encoded)
    pub async fn from_url(
        url: &url::Url,
        client: &reqwest::Client,
    ) -> Result<Self, ResolutionError> {
        match url.scheme() {
            "data" => {
                let (_, base64_data) = url.as_str().split_once(',').ok_or_else(|| {
                    ResolutionError::Decode("invalid media data URL format".to_string())
                })?;
                if base64_data.is_empty() {
                    return Err(ResolutionError::Decode("media data URL is empty".to_string()));
                }
                Ok(Self {
                    bytes: base64_data.as_bytes().to_vec(),
                    b64_encoded: true,
                })
            }
            "http" | "https" => {
                let response = client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| ResolutionError::Fetch(format!("{url}: {e}")))?;
                let status = response.status();
                if !status.is_success() {
                    return Err(ResolutionError::Fetch(format!("{url}: HTTP {status}")));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| ResolutionError::Fetch(format!("{url}: {e}")))?;
                if bytes.is_empty() {
                    return Err(ResolutionError::Fetch(format!("{url}: empty body")));
                }
                Ok(Self::from_raw(bytes.to_vec()))
            }
            scheme => Err(ResolutionError::Fetch(format!(
                "unsupported media URL scheme: {scheme}"
            ))),
        }
    }

    /// Inline image text as sent by callers: plain base64, or a full `data:` URL.
    pub fn from_inline(encoded: &str) -> Result<Self, ResolutionError> {
        let payload = match encoded.split_once(',') {
            Some((header, data)) if header.starts_with("data:") => data,
            _ => encoded,
        };
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(ResolutionError::Decode("inline image is empty".to_string()));
        }
        Ok(Self {
            bytes: payload.as_bytes().to_vec(),
            b64_encoded: true,
        })
    }

    // Potentially decodes b64 bytes
    pub fn into_bytes(self) -> Result<Vec<u8>, ResolutionError> {
        if !self.b64_encoded {
            return Ok(self.bytes);
        }
        let text = std::str::from_utf8(&self.bytes)
            .map_err(|_| ResolutionError::Decode("base64 payload is not text".to_string()))?;
        codec::decode_image(text)
    }
}

/// A decoded still image in 8-bit RGB. Alpha and extra channels are discarded at
/// construction, so every consumer sees the same 3-channel layout.
pub struct ResolvedImage {
    pixels: RgbImage,
    source: MediaFormat,
}

impl ResolvedImage {
    pub fn new(image: DynamicImage, source: MediaFormat) -> Self {
        Self {
            pixels: image.into_rgb8(),
            source,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Container the image was decoded from
    pub fn source_format(&self) -> MediaFormat {
        self.source
    }
}

impl fmt::Debug for ResolvedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("source", &self.source)
            .finish()
    }
}
