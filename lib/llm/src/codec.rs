// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Text-safe encodings used on the wire.
//!
//! Images travel as standard base64 of a PNG container, which keeps the round trip
//! pixel-exact. Streamed completions travel as chunked UTF-8; a chunk may end in the
//! middle of a multi-byte character, so [`TextChunkDecoder`] carries the incomplete
//! tail over to the next chunk.

use std::io::Cursor;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use image::ImageFormat;

use crate::preprocessor::media::{ResolutionError, ResolvedImage};

/// Accepts padded and unpadded input; callers are not consistent about it.
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// PNG-encode `image` and return it as standard, padded base64.
pub fn encode_image(image: &ResolvedImage) -> Result<String, image::ImageError> {
    let mut png = Vec::new();
    image
        .pixels()
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(png))
}

/// Base64 text to raw bytes. Embedded whitespace (line-wrapped payloads) is ignored.
pub fn decode_image(encoded: &str) -> Result<Vec<u8>, ResolutionError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(LENIENT_STANDARD.decode(compact)?)
}

/// Decode one self-contained chunk. Anything that is not valid UTF-8 becomes an empty
/// fragment.
pub fn decode_text_chunk(chunk: &[u8]) -> String {
    std::str::from_utf8(chunk)
        .map(str::to_string)
        .unwrap_or_default()
}

/// Incremental UTF-8 decoder for a chunked byte stream.
#[derive(Debug, Default)]
pub struct TextChunkDecoder {
    pending: Vec<u8>,
}

impl TextChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the text completed by `chunk`, possibly empty.
    ///
    /// A truncated character at the end is held back until the next call. Bytes that can
    /// never form valid UTF-8 discard the buffered data and yield an empty fragment.
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_string();
                self.pending.clear();
                text
            }
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let tail = self.pending.split_off(valid);
                String::from_utf8(std::mem::replace(&mut self.pending, tail)).unwrap_or_default()
            }
            Err(_) => {
                tracing::debug!(len = self.pending.len(), "dropping undecodable chunk");
                self.pending.clear();
                String::new()
            }
        }
    }

    /// Flush at end of stream. An incomplete trailing character is dropped.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        decode_text_chunk(&rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessor::media::{EncodedMediaData, ImageDecoder, MediaFormat};
    use image::{DynamicImage, Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> ResolvedImage {
        let pixels = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 30) as u8, (y * 40) as u8, ((x + y) * 5) as u8])
        });
        ResolvedImage::new(DynamicImage::ImageRgb8(pixels), MediaFormat::Jpeg)
    }

    #[test]
    fn test_encoded_image_decodes_pixel_identical() {
        let original = gradient(6, 4);
        let encoded = encode_image(&original).unwrap();

        let bytes = decode_image(&encoded).unwrap();
        assert_eq!(MediaFormat::sniff(&bytes).unwrap(), MediaFormat::Png);

        let decoded = ImageDecoder::default()
            .decode_bytes(bytes.clone(), MediaFormat::Png)
            .unwrap();
        assert_eq!(decoded.pixels(), original.pixels());

        // and through the inline path callers use
        let inline = EncodedMediaData::from_inline(&format!("data:image/png;base64,{encoded}"))
            .unwrap()
            .into_bytes()
            .unwrap();
        assert_eq!(inline, bytes);
    }

    #[test]
    fn test_decode_image_is_lenient_on_padding_and_whitespace() {
        // "hello" is aGVsbG8= padded
        assert_eq!(decode_image("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_image("aGVsbG8").unwrap(), b"hello");
        assert_eq!(decode_image("aGVs\nbG8=\r\n").unwrap(), b"hello");
    }

    #[test]
    fn test_decode_image_rejects_garbage() {
        let err = decode_image("not*base64!").unwrap_err();
        assert!(matches!(err, ResolutionError::Decode(_)));
    }

    #[test]
    fn test_decode_text_chunk() {
        assert_eq!(decode_text_chunk(b"plain"), "plain");
        assert_eq!(decode_text_chunk(&[0xff, 0xfe]), "");
        assert_eq!(decode_text_chunk(b""), "");
    }

    #[test]
    fn test_chunk_decoder_carries_split_characters() {
        let text = "naïve 東京";
        let bytes = text.as_bytes();
        let mut decoder = TextChunkDecoder::new();
        let mut out = String::new();
        for chunk in bytes.chunks(1) {
            out.push_str(&decoder.push(chunk));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, text);
    }

    #[test]
    fn test_chunk_decoder_split_mid_character() {
        let bytes = "é!".as_bytes();
        let mut decoder = TextChunkDecoder::new();
        assert_eq!(decoder.push(&bytes[..1]), "");
        assert_eq!(decoder.push(&bytes[1..]), "é!");
    }

    #[test]
    fn test_chunk_decoder_drops_invalid_then_recovers() {
        let mut decoder = TextChunkDecoder::new();
        assert_eq!(decoder.push(&[b'a', 0xff, b'b']), "");
        assert_eq!(decoder.push(b"next"), "next");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_finish_drops_truncated_tail() {
        let mut decoder = TextChunkDecoder::new();
        assert_eq!(decoder.push(&"東".as_bytes()[..2]), "");
        assert_eq!(decoder.finish(), "");
    }
}
