// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::io::Cursor;

use image::ImageReader;
use serde::{Deserialize, Serialize};

use super::super::common::{EncodedMediaData, ResolvedImage};
use super::super::{MediaFormat, ResolutionError};
use super::Decoder;

const DEFAULT_MAX_ALLOC: u64 = 128 * 1024 * 1024; // 128 MB

/// Image decoder limits, set from the gateway configuration only.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageDecoderLimits {
    #[serde(default)]
    pub max_image_width: Option<u32>,
    #[serde(default)]
    pub max_image_height: Option<u32>,
    /// Maximum allowed total allocation of the decoder in bytes
    #[serde(default)]
    pub max_alloc: Option<u64>,
}

impl Default for ImageDecoderLimits {
    fn default() -> Self {
        Self {
            max_image_width: None,
            max_image_height: None,
            max_alloc: Some(DEFAULT_MAX_ALLOC),
        }
    }
}

/// Decodes JPEG and PNG bytes into a [`ResolvedImage`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageDecoder {
    #[serde(default)]
    pub(crate) limits: ImageDecoderLimits,
}

impl ImageDecoder {
    pub fn new(limits: ImageDecoderLimits) -> Self {
        Self { limits }
    }

    /// Decode bytes already classified as `format`.
    pub fn decode_bytes(
        &self,
        bytes: Vec<u8>,
        format: MediaFormat,
    ) -> Result<ResolvedImage, ResolutionError> {
        let image_format = format.image_format().ok_or_else(|| {
            ResolutionError::Decode(format!("{format} is not a still image container"))
        })?;

        let mut reader = ImageReader::with_format(Cursor::new(bytes), image_format);
        let mut limits = image::Limits::no_limits();
        limits.max_image_width = self.limits.max_image_width;
        limits.max_image_height = self.limits.max_image_height;
        limits.max_alloc = self.limits.max_alloc;
        reader.limits(limits);

        let img = reader.decode()?;
        Ok(ResolvedImage::new(img, format))
    }
}

impl Decoder for ImageDecoder {
    type Output = ResolvedImage;

    fn decode(&self, data: EncodedMediaData) -> Result<ResolvedImage, ResolutionError> {
        let bytes = data.into_bytes()?;
        let format = MediaFormat::sniff(&bytes)?;
        self.decode_bytes(bytes, format)
    }
}
