// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

mod common;
mod decoders;
mod error;
mod format;
mod loader;

pub use common::{EncodedMediaData, ResolvedImage};
pub use decoders::{
    Decoder, DocumentPageExtractor, ImageDecoder, ImageDecoderLimits, MediaDecoder,
    PageRasterizer, PdfiumRasterizer, check_page_index,
};
pub use error::ResolutionError;
pub use format::MediaFormat;
pub use loader::{DEFAULT_DOCUMENT_PAGE, MediaFetcher, MediaLoader};
