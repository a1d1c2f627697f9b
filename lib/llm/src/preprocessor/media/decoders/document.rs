// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Rasterizing a single page of a paginated document.
//!
//! Pages are rendered at 1.0x their native size with no rotation, then go through the
//! same RGB normalization as directly decoded images. Nothing is cached between calls.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::{PdfPageIndex, PdfRenderConfig, Pdfium};

use super::super::common::ResolvedImage;
use super::super::{MediaFormat, ResolutionError};

/// Native page size
pub const REFERENCE_SCALE: f32 = 1.0;

/// Backend that turns one page of a document into a bitmap.
///
/// Implementations must report an out-of-range `page` with [`check_page_index`] once the
/// page count is known.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(
        &self,
        document: &[u8],
        page: i64,
        scale: f32,
    ) -> Result<DynamicImage, ResolutionError>;
}

/// `Ok(page)` iff `0 <= page < page_count`.
pub fn check_page_index(page: i64, page_count: usize) -> Result<usize, ResolutionError> {
    usize::try_from(page)
        .ok()
        .filter(|&p| p < page_count)
        .ok_or(ResolutionError::PageOutOfRange { page, page_count })
}

#[derive(Clone)]
pub struct DocumentPageExtractor {
    rasterizer: Arc<dyn PageRasterizer>,
    scale: f32,
}

impl DocumentPageExtractor {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>) -> Self {
        Self {
            rasterizer,
            scale: REFERENCE_SCALE,
        }
    }

    /// Extractor backed by pdfium, loaded from `library_dir` or the system library path.
    pub fn pdfium(library_dir: Option<PathBuf>) -> Self {
        Self::new(Arc::new(PdfiumRasterizer::new(library_dir)))
    }

    /// Synchronous and CPU-bound; see [`Self::extract_page_async`].
    pub fn extract_page(
        &self,
        document: &[u8],
        page: i64,
    ) -> Result<ResolvedImage, ResolutionError> {
        let bitmap = self.rasterizer.rasterize(document, page, self.scale)?;
        Ok(ResolvedImage::new(bitmap, MediaFormat::Pdf))
    }

    pub async fn extract_page_async(
        &self,
        document: Vec<u8>,
        page: i64,
    ) -> Result<ResolvedImage, ResolutionError> {
        let extractor = self.clone();
        tokio_rayon::spawn(move || extractor.extract_page(&document, page)).await
    }
}

impl Default for DocumentPageExtractor {
    fn default() -> Self {
        Self::pdfium(None)
    }
}

impl fmt::Debug for DocumentPageExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentPageExtractor")
            .field("scale", &self.scale)
            .finish_non_exhaustive()
    }
}

/// pdfium bound on first use and shared by every render afterwards. A failed bind is
/// remembered as well; the library does not appear while the process runs.
#[derive(Debug, Default)]
pub struct PdfiumRasterizer {
    library_dir: Option<PathBuf>,
    pdfium: OnceLock<Result<Pdfium, String>>,
}

impl PdfiumRasterizer {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self {
            library_dir,
            pdfium: OnceLock::new(),
        }
    }

    fn pdfium(&self) -> Result<&Pdfium, ResolutionError> {
        self.pdfium
            .get_or_init(|| {
                let bindings = match &self.library_dir {
                    Some(dir) => {
                        let dir = dir.to_string_lossy().to_string();
                        Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
                    }
                    None => Pdfium::bind_to_system_library(),
                };
                match bindings {
                    Ok(bindings) => {
                        tracing::info!(library_dir = ?self.library_dir, "pdfium bound");
                        Ok(Pdfium::new(bindings))
                    }
                    Err(e) => {
                        tracing::error!(library_dir = ?self.library_dir, error = ?e, "pdfium unavailable");
                        Err(format!("pdfium library unavailable: {e:?}"))
                    }
                }
            })
            .as_ref()
            .map_err(|e| ResolutionError::Render(e.clone()))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        document: &[u8],
        page: i64,
        scale: f32,
    ) -> Result<DynamicImage, ResolutionError> {
        let pdfium = self.pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(document, None)
            .map_err(|e| ResolutionError::Decode(format!("unreadable document: {e:?}")))?;

        let pages = document.pages();
        let index = check_page_index(page, pages.len() as usize)?;
        let page = pages
            .get(index as PdfPageIndex)
            .map_err(|e| ResolutionError::Render(format!("page {index}: {e:?}")))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| ResolutionError::Render(format!("page {index}: {e:?}")))?;

        let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
        let rgba = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes()).ok_or_else(|| {
            ResolutionError::Render(format!(
                "page {index}: bitmap does not match its {width}x{height} size"
            ))
        })?;
        Ok(DynamicImage::ImageRgba8(rgba))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use rstest::rstest;

    /// Pretends every document has `pages` pages, each a solid color.
    struct FakeRasterizer {
        pages: usize,
    }

    impl PageRasterizer for FakeRasterizer {
        fn rasterize(
            &self,
            document: &[u8],
            page: i64,
            scale: f32,
        ) -> Result<DynamicImage, ResolutionError> {
            if !document.starts_with(b"%PDF") {
                return Err(ResolutionError::Decode("not a document".to_string()));
            }
            let index = check_page_index(page, self.pages)?;
            let side = (10.0 * scale) as u32;
            let shade = (index as u8).wrapping_mul(40);
            Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                side,
                side,
                Rgba([shade, 0, 255, 128]),
            )))
        }
    }

    fn extractor(pages: usize) -> DocumentPageExtractor {
        DocumentPageExtractor::new(Arc::new(FakeRasterizer { pages }))
    }

    #[rstest]
    #[case(0, 3, true)]
    #[case(2, 3, true)]
    #[case(3, 3, false)]
    #[case(-1, 3, false)]
    #[case(i64::MIN, 3, false)]
    #[case(0, 0, false)]
    fn test_check_page_index(#[case] page: i64, #[case] count: usize, #[case] ok: bool) {
        let result = check_page_index(page, count);
        assert_eq!(result.is_ok(), ok, "page {page} of {count}");
        if !ok {
            assert_eq!(
                result.unwrap_err(),
                ResolutionError::PageOutOfRange {
                    page,
                    page_count: count
                }
            );
        }
    }

    #[test]
    fn test_extract_page_normalizes_to_rgb() {
        let image = extractor(3).extract_page(b"%PDF-1.7", 1).unwrap();
        assert_eq!((image.width(), image.height()), (10, 10));
        assert_eq!(image.source_format(), MediaFormat::Pdf);
        assert_eq!(image.pixels().get_pixel(0, 0).0, [40, 0, 255]);
    }

    #[test]
    fn test_extract_page_out_of_range() {
        let err = extractor(2).extract_page(b"%PDF-1.7", 2).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::PageOutOfRange {
                page: 2,
                page_count: 2
            }
        );
    }

    #[tokio::test]
    async fn test_extract_page_async() {
        let image = extractor(1)
            .extract_page_async(b"%PDF-1.7".to_vec(), 0)
            .await
            .unwrap();
        assert_eq!(image.width(), 10);
    }

    /// Two empty US-letter pages. pdfium rebuilds the cross-reference table, so the
    /// offsets below need not be exact.
    const TWO_PAGE_PDF: &[u8] = b"%PDF-1.4
1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj
2 0 obj << /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 >> endobj
3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >> endobj
4 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >> endobj
trailer << /Root 1 0 R /Size 5 >>
%%EOF
";

    #[test]
    fn test_missing_pdfium_is_reported_every_time() {
        let rasterizer = PdfiumRasterizer::new(Some(PathBuf::from("/nonexistent/pdfium")));
        for _ in 0..2 {
            assert!(matches!(
                rasterizer.rasterize(TWO_PAGE_PDF, 0, REFERENCE_SCALE),
                Err(ResolutionError::Render(_))
            ));
        }
        assert!(rasterizer.pdfium.get().is_some_and(Result::is_err));
    }

    #[test]
    #[ignore = "needs the pdfium shared library"]
    fn test_pdfium_renders_native_size() {
        let extractor = DocumentPageExtractor::default();
        let page = extractor.extract_page(TWO_PAGE_PDF, 1).unwrap();
        assert_eq!((page.width(), page.height()), (612, 792));

        let err = extractor.extract_page(TWO_PAGE_PDF, 2).unwrap_err();
        assert_eq!(
            err,
            ResolutionError::PageOutOfRange {
                page: 2,
                page_count: 2
            }
        );
    }
}
