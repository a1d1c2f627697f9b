// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use super::ResolutionError;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47];
const PDF_MAGIC: &[u8] = b"%PDF";

/// Containers the gateway accepts, classified by magic bytes only. The file name, URL
/// suffix and `content-type` header are never consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Jpeg,
    Png,
    /// Paginated document; a single page is rasterized
    Pdf,
}

impl MediaFormat {
    pub fn sniff(bytes: &[u8]) -> Result<Self, ResolutionError> {
        if bytes.starts_with(JPEG_MAGIC) {
            Ok(MediaFormat::Jpeg)
        } else if bytes.starts_with(PNG_MAGIC) {
            Ok(MediaFormat::Png)
        } else if bytes.starts_with(PDF_MAGIC) {
            Ok(MediaFormat::Pdf)
        } else {
            Err(ResolutionError::UnsupportedFormat {
                prefix: hex_prefix(bytes),
            })
        }
    }

    pub fn is_paginated(&self) -> bool {
        matches!(self, MediaFormat::Pdf)
    }

    /// Decoder format for still images, `None` for documents.
    pub(crate) fn image_format(&self) -> Option<image::ImageFormat> {
        match self {
            MediaFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            MediaFormat::Png => Some(image::ImageFormat::Png),
            MediaFormat::Pdf => None,
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MediaFormat::Jpeg => "jpeg",
            MediaFormat::Png => "png",
            MediaFormat::Pdf => "pdf",
        };
        write!(f, "{s}")
    }
}

fn hex_prefix(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }
    bytes
        .iter()
        .take(4)
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&[0xFF, 0xD8, 0xFF, 0xE0, 0x00], MediaFormat::Jpeg)]
    #[case(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A], MediaFormat::Png)]
    #[case(b"%PDF-1.7\n", MediaFormat::Pdf)]
    fn test_sniff_known(#[case] bytes: &[u8], #[case] expected: MediaFormat) {
        assert_eq!(MediaFormat::sniff(bytes).unwrap(), expected);
    }

    #[rstest]
    #[case(b"GIF89a", "47 49 46 38")]
    #[case(b"BM\x00\x00", "42 4D 00 00")]
    #[case(&[0xFF, 0xD8], "FF D8")]
    #[case(b"", "<empty>")]
    fn test_sniff_unsupported(#[case] bytes: &[u8], #[case] prefix: &str) {
        let err = MediaFormat::sniff(bytes).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::UnsupportedFormat {
                prefix: prefix.to_string()
            }
        );
    }

    #[test]
    fn test_only_documents_are_paginated() {
        assert!(MediaFormat::Pdf.is_paginated());
        assert!(!MediaFormat::Png.is_paginated());
        assert_eq!(MediaFormat::Pdf.image_format(), None);
        assert_eq!(
            MediaFormat::Jpeg.image_format(),
            Some(image::ImageFormat::Jpeg)
        );
    }
}
