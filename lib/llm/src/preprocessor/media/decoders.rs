// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use super::ResolutionError;
use super::common::EncodedMediaData;

pub mod document;
pub mod image;

pub use document::{DocumentPageExtractor, PageRasterizer, PdfiumRasterizer, check_page_index};
pub use self::image::{ImageDecoder, ImageDecoderLimits};

#[async_trait::async_trait]
pub trait Decoder: Clone + Send + Sync + 'static {
    type Output: Send + 'static;

    fn decode(&self, data: EncodedMediaData) -> Result<Self::Output, ResolutionError>;

    async fn decode_async(&self, data: EncodedMediaData) -> Result<Self::Output, ResolutionError> {
        // light clone (only config params)
        let decoder = self.clone();
        // compute heavy -> rayon
        tokio_rayon::spawn(move || decoder.decode(data)).await
    }
}

#[derive(Clone, Debug, Default)]
pub struct MediaDecoder {
    pub image_decoder: ImageDecoder,
    pub document_extractor: DocumentPageExtractor,
}
