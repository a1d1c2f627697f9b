// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Request Batch Router
//!
//! Takes endpoint-independent [`CompletionRequest`]s through the pipeline: command
//! interception, image resolution, prompt assembly, then generation. Items of a batch
//! are processed concurrently, at most [`DEFAULT_ITEM_CONCURRENCY`] at a time, and
//! independently; each failure lands in its own result slot. Generation itself is
//! serialized by the dispatcher.

use std::sync::Arc;

use futures::StreamExt;

use crate::codec;
use crate::commands::PromptCommand;
use crate::dispatcher::{DispatchError, GenerationDispatcher, TokenStream};
use crate::error::GatewayError;
use crate::preprocessor::media::MediaLoader;
use crate::preprocessor::prompt::{Conversation, PromptAssembler};
use crate::protocols::{BatchResult, CompletionOutput, CompletionRequest, ItemFailure, ItemResult};

/// Batch items fetched and decoded at the same time
pub const DEFAULT_ITEM_CONCURRENCY: usize = 8;

pub struct RequestBatchRouter {
    media: Arc<MediaLoader>,
    assembler: PromptAssembler,
    dispatcher: Arc<GenerationDispatcher>,
    item_concurrency: usize,
}

impl RequestBatchRouter {
    pub fn new(
        media: Arc<MediaLoader>,
        assembler: PromptAssembler,
        dispatcher: Arc<GenerationDispatcher>,
    ) -> Self {
        Self {
            media,
            assembler,
            dispatcher,
            item_concurrency: DEFAULT_ITEM_CONCURRENCY,
        }
    }

    pub fn with_item_concurrency(mut self, item_concurrency: usize) -> Self {
        self.item_concurrency = item_concurrency.max(1);
        self
    }

    pub fn dispatcher(&self) -> &Arc<GenerationDispatcher> {
        &self.dispatcher
    }

    /// One result per request, each carrying its request's index.
    ///
    /// Streaming flags are ignored here; streaming goes through [`Self::route_stream`].
    pub async fn route(&self, requests: Vec<CompletionRequest>) -> BatchResult {
        tracing::debug!(items = requests.len(), "routing batch");
        futures::stream::iter(requests)
            .map(|request| async move {
                let index = request.index;
                match self.complete(request).await {
                    Ok(output) => ItemResult::completed(index, output),
                    Err(err) => {
                        tracing::warn!(index, kind = err.kind(), %err, "request item failed");
                        ItemResult::failed(index, ItemFailure::from(&err))
                    }
                }
            })
            .buffered(self.item_concurrency)
            .collect()
            .await
    }

    /// Batch-mode completion of a single request.
    pub async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionOutput, GatewayError> {
        let (conversation, image) = self.prepare(&request, request.return_image).await?;
        let text = self
            .dispatcher
            .generate(conversation, request.generation_args)
            .await?;
        Ok(CompletionOutput { text, image })
    }

    /// Streaming completion of a single request.
    ///
    /// Every failure up to the start of generation is returned here, so the caller can
    /// still answer with an error status.
    pub async fn route_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<TokenStream, GatewayError> {
        // cheap pre-check so a busy model does not cost a fetch; the dispatcher decides
        if self.dispatcher.is_streaming() {
            return Err(DispatchError::ConcurrentStream.into());
        }
        let (conversation, _) = self.prepare(&request, false).await?;
        Ok(self
            .dispatcher
            .generate_stream(conversation, request.generation_args)?)
    }

    async fn prepare(
        &self,
        request: &CompletionRequest,
        encode_image: bool,
    ) -> Result<(Conversation, Option<String>), GatewayError> {
        tracing::info!(
            index = request.index,
            has_image = request.image.is_some(),
            stream = request.stream,
            "routing request"
        );
        tracing::debug!(index = request.index, prompt = %request.prompt, "prompt");

        if let Some(command) = PromptCommand::parse(&request.prompt) {
            return Err(GatewayError::CommandIntercepted(command));
        }
        request.generation_args.validate()?;

        let image = match &request.image {
            Some(source) => Some(self.media.resolve(source).await?),
            None => None,
        };

        let encoded = match (&image, encode_image) {
            (Some(image), true) => Some(
                codec::encode_image(image).map_err(|e| GatewayError::Encode(e.to_string()))?,
            ),
            _ => None,
        };

        let conversation = match request.system_prompt.as_deref() {
            Some(system) => {
                self.assembler
                    .assemble_with_system(Some(system), &request.prompt, image)
            }
            None => self.assembler.assemble(&request.prompt, image),
        };
        Ok((conversation, encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::StreamExt;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    use crate::dispatcher::DispatcherConfig;
    use crate::engines::{EchoEngine, GenerationRequest, ModelEngine, TokenSink};
    use crate::preprocessor::media::{MediaDecoder, MediaFetcher};
    use crate::preprocessor::prompt::ChatTemplate;
    use crate::protocols::{GenerationArgs, ImageSource};

    const EOS: &str = "<|endoftext|>";

    /// Echo engine that counts its invocations.
    struct CountingEngine {
        inner: EchoEngine,
        calls: Arc<AtomicUsize>,
    }

    impl ModelEngine for CountingEngine {
        fn name(&self) -> &str {
            "counting-echo"
        }

        fn generate(
            &mut self,
            request: &GenerationRequest,
            sink: &mut dyn TokenSink,
        ) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.generate(request, sink)
        }
    }

    fn router_with(delay: Duration) -> (RequestBatchRouter, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let engine = CountingEngine {
            inner: EchoEngine::new(ChatTemplate::default(), EOS).with_token_delay(delay),
            calls: calls.clone(),
        };
        let dispatcher = GenerationDispatcher::new(Box::new(engine), DispatcherConfig::default());
        let media = MediaLoader::new(
            MediaDecoder::default(),
            MediaFetcher {
                allow_direct_ip: true,
                allow_direct_port: true,
                ..Default::default()
            },
        )
        .unwrap();
        let router = RequestBatchRouter::new(
            Arc::new(media),
            PromptAssembler::default(),
            Arc::new(dispatcher),
        );
        (router, calls)
    }

    fn png_base64(width: u32, height: u32) -> String {
        use base64::Engine as _;
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([9, 8, 7])))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[tokio::test]
    async fn test_failed_item_does_not_abort_batch() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing.png")
            .with_status(404)
            .create_async()
            .await;

        let (router, _) = router_with(Duration::ZERO);
        let requests = vec![
            CompletionRequest::new(10, "first item"),
            CompletionRequest::new(11, "second item").with_image(Some(ImageSource::RemoteUrl {
                url: format!("{}/missing.png", server.url()),
                page: None,
            })),
            CompletionRequest::new(12, "third item"),
        ];

        let results = router.route(requests).await;
        assert_eq!(results.len(), 3);
        assert_eq!(
            results.iter().map(ItemResult::index).collect::<Vec<_>>(),
            vec![10, 11, 12]
        );
        assert_eq!(results[0].body().output_text(), Some("first item"));
        assert_eq!(results[1].body().failure().unwrap().kind, "FetchError");
        assert_eq!(results[2].body().output_text(), Some("third item"));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_bounded_concurrency_keeps_order() {
        let (router, calls) = router_with(Duration::from_millis(2));
        let router = router.with_item_concurrency(3);

        let requests: Vec<CompletionRequest> = (0..10)
            .rev()
            .map(|i| match i % 4 {
                0 => CompletionRequest::new(i, "/file"),
                _ => CompletionRequest::new(i, format!("item {i}")),
            })
            .collect();

        let results = router.route(requests).await;
        assert_eq!(
            results.iter().map(ItemResult::index).collect::<Vec<_>>(),
            (0..10).rev().collect::<Vec<_>>()
        );
        for result in &results {
            let index = result.index();
            if index % 4 == 0 {
                assert_eq!(
                    result.body().failure().unwrap().kind,
                    "CommandInterceptedError"
                );
            } else {
                assert_eq!(result.body().output_text(), Some(format!("item {index}").as_str()));
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_in_process_document_page() {
        use crate::preprocessor::media::{
            DocumentPageExtractor, ImageDecoder, PageRasterizer, ResolutionError,
            check_page_index,
        };

        /// Three pages, page `n` is `n + 1` pixels wide.
        struct ThreePages;

        impl PageRasterizer for ThreePages {
            fn rasterize(
                &self,
                _document: &[u8],
                page: i64,
                _scale: f32,
            ) -> Result<DynamicImage, ResolutionError> {
                let index = check_page_index(page, 3)?;
                Ok(DynamicImage::ImageRgb8(RgbImage::new(index as u32 + 1, 1)))
            }
        }

        let media = MediaLoader::new(
            MediaDecoder {
                image_decoder: ImageDecoder::default(),
                document_extractor: DocumentPageExtractor::new(Arc::new(ThreePages)),
            },
            MediaFetcher::default(),
        )
        .unwrap();
        let engine = EchoEngine::new(ChatTemplate::default(), EOS);
        let router = RequestBatchRouter::new(
            Arc::new(media),
            PromptAssembler::default(),
            Arc::new(GenerationDispatcher::new(Box::new(engine), DispatcherConfig::default())),
        );

        let document = bytes::Bytes::from_static(b"%PDF-1.7 scanned invoice");
        let results = router
            .route(vec![
                CompletionRequest::new(0, "total?").with_image(Some(ImageSource::DocumentPage {
                    document: document.clone(),
                    page: 2,
                })),
                CompletionRequest::new(1, "total?").with_image(Some(ImageSource::DocumentPage {
                    document,
                    page: 3,
                })),
            ])
            .await;

        assert_eq!(results[0].body().output_text(), Some("[image 3x1] total?"));
        assert_eq!(results[1].body().failure().unwrap().kind, "PageOutOfRangeError");
    }

    #[tokio::test]
    async fn test_command_never_reaches_the_model() {
        let (router, calls) = router_with(Duration::ZERO);

        let results = router.route(vec![CompletionRequest::new(0, "/url")]).await;
        assert_eq!(
            results[0].body().failure().unwrap().kind,
            "CommandInterceptedError"
        );

        let err = router
            .route_stream(CompletionRequest::new(0, " /upload ").streaming())
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::CommandIntercepted(PromptCommand::Upload));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_args_never_reach_the_model() {
        let (router, calls) = router_with(Duration::ZERO);
        let request = CompletionRequest::new(0, "hi").with_generation_args(GenerationArgs {
            temperature: Some(0.0),
            ..Default::default()
        });

        let results = router.route(vec![request]).await;
        assert_eq!(results[0].body().failure().unwrap().kind, "ValidationError");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_returns_resolved_image_when_asked() {
        let (router, _) = router_with(Duration::ZERO);
        let mut request = CompletionRequest::new(4, "describe").with_image(Some(
            ImageSource::InlineEncoded {
                data: png_base64(3, 2),
                page: None,
            },
        ));
        request.return_image = true;

        let output = router.complete(request).await.unwrap();
        assert_eq!(output.text, "[image 3x2] describe");
        let returned = codec::decode_image(output.image.as_deref().unwrap()).unwrap();
        assert!(returned.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[tokio::test]
    async fn test_request_system_prompt_is_used() {
        let (router, _) = router_with(Duration::ZERO);
        let request = CompletionRequest::text_only(1, "hello", "Be brief.");
        let output = router.complete(request).await.unwrap();
        assert_eq!(output.text, "hello");
        assert!(output.image.is_none());
    }

    #[tokio::test]
    async fn test_stream_matches_batch_and_is_exclusive() {
        let (router, _) = router_with(Duration::from_millis(10));
        let args = GenerationArgs::deterministic(32);
        let prompt = "streaming and batch agree";

        let batch = router
            .complete(CompletionRequest::new(0, prompt).with_generation_args(args.clone()))
            .await
            .unwrap();

        let stream = router
            .route_stream(
                CompletionRequest::new(0, prompt)
                    .with_generation_args(args.clone())
                    .streaming(),
            )
            .await
            .unwrap();

        let second = router
            .route_stream(CompletionRequest::new(1, "intruder").streaming())
            .await;
        assert!(matches!(
            second,
            Err(GatewayError::Dispatch(DispatchError::ConcurrentStream))
        ));

        let fragments: Vec<String> = stream.map(|item| item.unwrap()).collect().await;
        assert_eq!(fragments.concat(), batch.text);
    }
}
