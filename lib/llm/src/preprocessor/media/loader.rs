// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;

use super::common::{EncodedMediaData, ResolvedImage};
use super::decoders::{Decoder, MediaDecoder};
use super::{MediaFormat, ResolutionError};
use crate::protocols::ImageSource;

const DEFAULT_HTTP_USER_AGENT: &str = "prism-gateway/0.4";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page rendered when a document arrives without an explicit page
pub const DEFAULT_DOCUMENT_PAGE: i64 = 0;

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct MediaFetcher {
    pub user_agent: String,
    pub allow_direct_ip: bool,
    pub allow_direct_port: bool,
    pub allowed_media_domains: Option<HashSet<String>>,
    pub timeout: Option<Duration>,
}

impl Default for MediaFetcher {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_HTTP_USER_AGENT.to_string(),
            allow_direct_ip: false,
            allow_direct_port: false,
            allowed_media_domains: None,
            timeout: Some(DEFAULT_HTTP_TIMEOUT),
        }
    }
}

/// Turns an [`ImageSource`] into a [`ResolvedImage`].
///
/// Remote sources are fetched once with no retry. The fetched or inline bytes are
/// classified by [`MediaFormat::sniff`]; documents are rasterized at the requested page
/// (default [`DEFAULT_DOCUMENT_PAGE`]), still images are decoded directly. Decoding runs
/// on the rayon pool.
pub struct MediaLoader {
    media_decoder: MediaDecoder,
    http_client: reqwest::Client,
    media_fetcher: MediaFetcher,
}

impl MediaLoader {
    pub fn new(media_decoder: MediaDecoder, media_fetcher: MediaFetcher) -> Result<Self> {
        let mut http_client_builder =
            reqwest::Client::builder().user_agent(&media_fetcher.user_agent);

        if let Some(timeout) = media_fetcher.timeout {
            http_client_builder = http_client_builder.timeout(timeout);
        }

        let http_client = http_client_builder.build()?;

        Ok(Self {
            media_decoder,
            http_client,
            media_fetcher,
        })
    }

    pub fn check_if_url_allowed(&self, url: &url::Url) -> Result<(), ResolutionError> {
        let deny = |reason: String| Err(ResolutionError::Fetch(format!("{url}: {reason}")));

        if !matches!(url.scheme(), "http" | "https" | "data") {
            return deny("only HTTP(S) and data URLs are allowed".to_string());
        }

        if url.scheme() == "data" {
            return Ok(());
        }

        if !self.media_fetcher.allow_direct_ip && !matches!(url.host(), Some(url::Host::Domain(_)))
        {
            return deny("direct IP access is not allowed".to_string());
        }
        if !self.media_fetcher.allow_direct_port && url.port().is_some() {
            return deny("direct port access is not allowed".to_string());
        }
        if let Some(allowed_domains) = &self.media_fetcher.allowed_media_domains
            && let Some(host) = url.host_str()
            && !allowed_domains.contains(host)
        {
            return deny(format!("domain '{host}' is not in allowed list"));
        }

        Ok(())
    }

    pub async fn resolve(&self, source: &ImageSource) -> Result<ResolvedImage, ResolutionError> {
        tracing::debug!(source = source.kind(), "resolving image");
        match source {
            ImageSource::RemoteUrl { url, page } => {
                let url = url::Url::parse(url)
                    .map_err(|e| ResolutionError::Fetch(format!("invalid image URL: {e}")))?;
                self.check_if_url_allowed(&url)?;
                let data = EncodedMediaData::from_url(&url, &self.http_client).await?;
                self.decode(data, *page).await
            }
            ImageSource::InlineEncoded { data, page } => {
                self.decode(EncodedMediaData::from_inline(data)?, *page)
                    .await
            }
            ImageSource::DocumentPage { document, page } => {
                MediaFormat::sniff(document)?;
                self.media_decoder
                    .document_extractor
                    .extract_page_async(document.to_vec(), *page)
                    .await
            }
        }
    }

    async fn decode(
        &self,
        data: EncodedMediaData,
        page: Option<i64>,
    ) -> Result<ResolvedImage, ResolutionError> {
        let bytes = data.into_bytes()?;
        let format = MediaFormat::sniff(&bytes)?;
        tracing::debug!(%format, len = bytes.len(), "sniffed media format");

        if format.is_paginated() {
            self.media_decoder
                .document_extractor
                .extract_page_async(bytes, page.unwrap_or(DEFAULT_DOCUMENT_PAGE))
                .await
        } else {
            self.media_decoder
                .image_decoder
                .decode_async(EncodedMediaData::from_raw(bytes))
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use base64::Engine as _;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

    use super::super::decoders::{
        DocumentPageExtractor, ImageDecoder, PageRasterizer, check_page_index,
    };
    use super::*;

    struct FakeRasterizer;

    impl PageRasterizer for FakeRasterizer {
        fn rasterize(
            &self,
            _document: &[u8],
            page: i64,
            _scale: f32,
        ) -> Result<DynamicImage, ResolutionError> {
            let index = check_page_index(page, 2)?;
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                4 + index as u32,
                4,
                Rgba([1, 2, 3, 4]),
            )))
        }
    }

    fn loader(fetcher: MediaFetcher) -> MediaLoader {
        let decoder = MediaDecoder {
            image_decoder: ImageDecoder::default(),
            document_extractor: DocumentPageExtractor::new(Arc::new(FakeRasterizer)),
        };
        MediaLoader::new(decoder, fetcher).unwrap()
    }

    fn local_loader() -> MediaLoader {
        loader(MediaFetcher {
            allow_direct_ip: true,
            allow_direct_port: true,
            ..Default::default()
        })
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([200, 100, 50]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_resolve_remote_png() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/scan.png")
            .with_status(200)
            .with_header("content-type", "application/octet-stream")
            .with_body(png_bytes(7, 5))
            .create_async()
            .await;

        let source = ImageSource::RemoteUrl {
            url: format!("{}/scan.png", server.url()),
            page: None,
        };
        let image = local_loader().resolve(&source).await.unwrap();
        assert_eq!((image.width(), image.height()), (7, 5));
        assert_eq!(image.source_format(), MediaFormat::Png);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_resolve_remote_document_uses_page() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/report.pdf")
            .with_status(200)
            .with_body("%PDF-1.7 pretend")
            .create_async()
            .await;

        let source = ImageSource::RemoteUrl {
            url: format!("{}/report.pdf", server.url()),
            page: Some(1),
        };
        let image = local_loader().resolve(&source).await.unwrap();
        assert_eq!(image.width(), 5);
        assert_eq!(image.pixels().get_pixel(0, 0).0, [1, 2, 3]);

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_resolve_remote_failure_is_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/gone.png")
            .with_status(503)
            .create_async()
            .await;

        let source = ImageSource::RemoteUrl {
            url: format!("{}/gone.png", server.url()),
            page: None,
        };
        let err = local_loader().resolve(&source).await.unwrap_err();
        assert!(matches!(err, ResolutionError::Fetch(_)));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_resolve_inline_and_document_page() {
        let loader = local_loader();
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes(3, 3));

        let inline = ImageSource::InlineEncoded {
            data: encoded,
            page: None,
        };
        assert_eq!(loader.resolve(&inline).await.unwrap().width(), 3);

        let document = ImageSource::DocumentPage {
            document: bytes::Bytes::from_static(b"%PDF-1.4"),
            page: 0,
        };
        assert_eq!(loader.resolve(&document).await.unwrap().width(), 4);

        let out_of_range = ImageSource::DocumentPage {
            document: bytes::Bytes::from_static(b"%PDF-1.4"),
            page: 2,
        };
        assert!(matches!(
            loader.resolve(&out_of_range).await,
            Err(ResolutionError::PageOutOfRange { page: 2, page_count: 2 })
        ));
    }

    #[tokio::test]
    async fn test_resolve_unsupported_inline() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"GIF89a\x01\x00");
        let source = ImageSource::InlineEncoded {
            data: encoded,
            page: None,
        };
        let err = local_loader().resolve(&source).await.unwrap_err();
        assert!(matches!(err, ResolutionError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_direct_ip_blocked() {
        let loader = loader(MediaFetcher::default());

        let url = url::Url::parse("http://192.168.1.1/image.jpg").unwrap();
        let err = loader.check_if_url_allowed(&url).unwrap_err();
        assert!(err.to_string().contains("direct IP access is not allowed"));
    }

    #[test]
    fn test_direct_port_blocked() {
        let loader = loader(MediaFetcher::default());

        let url = url::Url::parse("http://example.com:8080/image.jpg").unwrap();
        let err = loader.check_if_url_allowed(&url).unwrap_err();
        assert!(err.to_string().contains("direct port access is not allowed"));
    }

    #[test]
    fn test_domain_allowlist() {
        let loader = loader(MediaFetcher {
            allowed_media_domains: Some(HashSet::from(["stage.example.com".to_string()])),
            ..Default::default()
        });

        let url = url::Url::parse("https://stage.example.com/a.png").unwrap();
        assert!(loader.check_if_url_allowed(&url).is_ok());

        let url = url::Url::parse("https://elsewhere.com/a.png").unwrap();
        let err = loader.check_if_url_allowed(&url).unwrap_err();
        assert!(err.to_string().contains("not in allowed list"));
    }
}
