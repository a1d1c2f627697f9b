// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use anyhow::Context as _;
use prism_llm::dispatcher::{DispatcherConfig, GenerationDispatcher};
use prism_llm::engines::{EchoEngine, ModelEngine};
use prism_llm::http::service::HttpService;
use prism_llm::preprocessor::media::{
    DocumentPageExtractor, ImageDecoder, ImageDecoderLimits, MediaDecoder, MediaFetcher,
    MediaLoader,
};
use prism_llm::preprocessor::prompt::{ChatTemplate, PromptAssembler};
use prism_llm::router::RequestBatchRouter;
use prism_runtime::{CancellationToken, GatewayConfig};

mod flags;
pub use flags::Flags;
mod opt;
pub use opt::Output;

/// Serve the gateway until `cancel_token` is cancelled.
pub async fn run(flags: Flags, cancel_token: CancellationToken) -> anyhow::Result<()> {
    let out_opt = flags.output()?;
    let config = flags.apply(GatewayConfig::from_settings()?)?;
    tracing::info!(engine = %out_opt, "gateway configuration: {config}");

    //
    // Create an engine
    //

    let engine = engine_for(out_opt, &flags, &config)?;
    let dispatcher = Arc::new(GenerationDispatcher::new(
        engine,
        DispatcherConfig::from(&config),
    ));
    tracing::info!(
        model = dispatcher.model_name(),
        model_id = config.model_id.as_deref().unwrap_or("<unset>"),
        "model loaded"
    );

    //
    // Wire the pipeline
    //

    let media = MediaLoader::new(media_decoder(&config), media_fetcher(&config))?;
    let router = RequestBatchRouter::new(
        Arc::new(media),
        PromptAssembler::new(config.system_prompt.clone()),
        dispatcher.clone(),
    );

    let mut builder = HttpService::builder()
        .host(config.http_host.clone())
        .port(config.http_port)
        .max_request_bytes(config.max_request_bytes)
        .router(Arc::new(router));
    if let Some(model_id) = &config.model_id {
        builder = builder.model_id(model_id.clone());
    }
    if let Some(system_prompt) = &config.system_prompt {
        builder = builder.text_system_prompt(system_prompt.clone());
    }
    let service = builder.build()?;

    // live streams end with Cancelled instead of running on after shutdown
    let shutdown = {
        let cancel_token = cancel_token.clone();
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            cancel_token.cancelled().await;
            dispatcher.shutdown();
        })
    };

    let result = service.run(cancel_token.clone()).await;
    cancel_token.cancel();
    let _ = shutdown.await;
    result
}

fn engine_for(
    out_opt: Output,
    flags: &Flags,
    config: &GatewayConfig,
) -> anyhow::Result<Box<dyn ModelEngine>> {
    let template = match &flags.chat_template {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read chat template {}", path.display()))?;
            ChatTemplate::new(source)?
        }
        None => ChatTemplate::default(),
    };

    match out_opt {
        Output::Echo => Ok(Box::new(
            EchoEngine::new(template, config.end_of_sequence_marker.clone())
                .with_token_delay(flags.token_echo_delay()),
        )),
    }
}

fn media_decoder(config: &GatewayConfig) -> MediaDecoder {
    let defaults = ImageDecoderLimits::default();
    MediaDecoder {
        image_decoder: ImageDecoder::new(ImageDecoderLimits {
            max_image_width: config.max_image_width,
            max_image_height: config.max_image_height,
            max_alloc: config.max_image_alloc_bytes.or(defaults.max_alloc),
        }),
        document_extractor: DocumentPageExtractor::pdfium(config.pdfium_library_path.clone()),
    }
}

fn media_fetcher(config: &GatewayConfig) -> MediaFetcher {
    MediaFetcher {
        allow_direct_ip: config.allow_direct_ip,
        allow_direct_port: config.allow_direct_port,
        timeout: Some(config.fetch_timeout()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    use clap::Parser;

    #[test]
    fn test_engine_for_reads_template_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.jinja");
        std::fs::write(
            &path,
            "{% for message in messages %}{{ message.content }}{% endfor %}",
        )
        .unwrap();

        let flags = Flags::try_parse_from([
            OsString::from("prism-run"),
            OsString::from("--chat-template"),
            path.into_os_string(),
        ])
        .unwrap();
        let engine = engine_for(Output::Echo, &flags, &GatewayConfig::default()).unwrap();
        assert_eq!(engine.name(), "echo");

        let flags = Flags::try_parse_from(["prism-run", "--chat-template", "/no/such/file"]).unwrap();
        assert!(engine_for(Output::Echo, &flags, &GatewayConfig::default()).is_err());
    }

    #[test]
    fn test_media_settings_follow_config() {
        let config = GatewayConfig {
            allow_direct_port: true,
            fetch_timeout_secs: 7,
            ..Default::default()
        };
        let fetcher = media_fetcher(&config);
        assert!(fetcher.allow_direct_port);
        assert!(!fetcher.allow_direct_ip);
        assert_eq!(fetcher.timeout, Some(std::time::Duration::from_secs(7)));
    }
}
