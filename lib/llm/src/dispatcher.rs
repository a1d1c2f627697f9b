// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Generation Dispatcher
//!
//! Owns the single loaded [`ModelEngine`] and exposes it in two modes:
//!
//! - **batch**: [`GenerationDispatcher::generate`] runs the engine to completion and
//!   returns the whole text.
//! - **stream**: [`GenerationDispatcher::generate_stream`] starts the engine on a
//!   blocking thread and returns a [`TokenStream`] fed through a bounded channel.
//!
//! The engine sits behind an async mutex, so calls of either mode never overlap inside
//! the model. On top of that at most one stream may be in flight per dispatcher; a second
//! `generate_stream` before the first has finished fails with
//! [`DispatchError::ConcurrentStream`].
//!
//! Dropping a [`TokenStream`] cancels its generation. Once the stream holds the model,
//! the consumer also gives up when no fragment arrives within the idle timeout. Waiting
//! for a batch generation to release the model does not count against it.

use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use derive_builder::Builder;
use futures::{Stream, StreamExt};
use tokio::sync::{Mutex, Semaphore, mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};

use prism_runtime::config::{
    DEFAULT_END_OF_SEQUENCE_MARKER, DEFAULT_STREAM_CHANNEL_CAPACITY,
    DEFAULT_STREAM_IDLE_TIMEOUT_SECS, GatewayConfig,
};

use crate::engines::{CollectingSink, GenerationRequest, ModelEngine, TokenSink};
use crate::preprocessor::prompt::Conversation;
use crate::protocols::{GenerationArgs, ValidationError};

/// Appended to a streamed body when generation fails after the first byte was sent
pub const STREAM_ERROR_SENTINEL: &str = "\n[PRISM_STREAM_ERROR] ";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("model inference failed: {0}")]
    ModelInference(String),

    #[error("a streaming generation is already in progress on this model")]
    ConcurrentStream,

    #[error("no output from the model within the stream idle timeout")]
    StreamTimeout,

    #[error("generation was cancelled")]
    Cancelled,
}

pub type StreamItem = Result<String, DispatchError>;

#[derive(Debug, Clone, Builder)]
#[builder(pattern = "owned")]
pub struct DispatcherConfig {
    /// Fragments buffered between the generating thread and the consumer
    #[builder(default = "DEFAULT_STREAM_CHANNEL_CAPACITY")]
    pub channel_capacity: usize,

    /// Longest wait for the next fragment
    #[builder(default = "Duration::from_secs(DEFAULT_STREAM_IDLE_TIMEOUT_SECS)")]
    pub idle_timeout: Duration,

    #[builder(default = "DEFAULT_END_OF_SEQUENCE_MARKER.to_string()", setter(into))]
    pub end_of_sequence_marker: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_STREAM_CHANNEL_CAPACITY,
            idle_timeout: Duration::from_secs(DEFAULT_STREAM_IDLE_TIMEOUT_SECS),
            end_of_sequence_marker: DEFAULT_END_OF_SEQUENCE_MARKER.to_string(),
        }
    }
}

impl From<&GatewayConfig> for DispatcherConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            channel_capacity: config.stream_channel_capacity,
            idle_timeout: config.stream_idle_timeout(),
            end_of_sequence_marker: config.end_of_sequence_marker.clone(),
        }
    }
}

impl DispatcherConfig {
    pub fn builder() -> DispatcherConfigBuilder {
        DispatcherConfigBuilder::default()
    }
}

pub struct GenerationDispatcher {
    engine: Arc<Mutex<Box<dyn ModelEngine>>>,
    stream_guard: Arc<Semaphore>,
    config: DispatcherConfig,
    model_name: String,
    cancel: CancellationToken,
}

impl GenerationDispatcher {
    pub fn new(engine: Box<dyn ModelEngine>, config: DispatcherConfig) -> Self {
        let model_name = engine.name().to_string();
        tracing::info!(model = %model_name, ?config, "generation dispatcher ready");
        Self {
            engine: Arc::new(Mutex::new(engine)),
            stream_guard: Arc::new(Semaphore::new(1)),
            config,
            model_name,
            cancel: CancellationToken::new(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// True while a stream holds the model.
    pub fn is_streaming(&self) -> bool {
        self.stream_guard.available_permits() == 0
    }

    /// Cancel every generation in progress and refuse to wait for the model afterwards.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Run one generation to completion. Waits for any generation already running.
    pub async fn generate(
        &self,
        conversation: Conversation,
        args: GenerationArgs,
    ) -> Result<String, DispatchError> {
        args.validate()?;

        let engine = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(DispatchError::Cancelled),
            guard = self.engine.clone().lock_owned() => guard,
        };

        let request = GenerationRequest { conversation, args };
        let start = tokio::time::Instant::now();
        let sink = tokio::task::spawn_blocking(move || {
            let mut engine = engine;
            let mut sink = CollectingSink::default();
            engine.generate(&request, &mut sink).map(|()| sink)
        })
        .await
        .map_err(|e| DispatchError::ModelInference(format!("generation task failed: {e}")))?
        .map_err(|e| DispatchError::ModelInference(format!("{e:#}")))?;

        tracing::info!(
            fragments = sink.fragments(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "generation finished"
        );
        Ok(strip_marker(
            &sink.into_text(),
            &self.config.end_of_sequence_marker,
        ))
    }

    /// Start a generation on a blocking thread and return its output as a stream.
    ///
    /// Arguments are validated and the stream slot is claimed before anything runs; both
    /// failures are reported here rather than inside the stream.
    pub fn generate_stream(
        &self,
        conversation: Conversation,
        args: GenerationArgs,
    ) -> Result<TokenStream, DispatchError> {
        args.validate()?;

        let permit = self
            .stream_guard
            .clone()
            .try_acquire_owned()
            .map_err(|_| DispatchError::ConcurrentStream)?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (started_tx, started_rx) = oneshot::channel();
        let cancel = self.cancel.child_token();
        let engine = self.engine.clone();
        let request = GenerationRequest { conversation, args };
        let marker = self.config.end_of_sequence_marker.clone();
        let producer_cancel = cancel.clone();

        tokio::spawn(async move {
            // held until the engine returns, not until the consumer leaves
            let _permit = permit;

            let engine = tokio::select! {
                guard = engine.lock_owned() => guard,
                _ = producer_cancel.cancelled() => {
                    tracing::debug!("stream cancelled while waiting for the model");
                    return;
                }
            };
            // the consumer may already be gone; the sink notices on its first fragment
            let _ = started_tx.send(());

            let error_tx = tx.clone();
            let start = tokio::time::Instant::now();
            let result = tokio::task::spawn_blocking(move || {
                let mut engine = engine;
                let mut sink = ChannelSink {
                    tx,
                    cancel: producer_cancel,
                    marker,
                    fragments: 0,
                };
                let result = engine.generate(&request, &mut sink);
                (result, sink.fragments, sink.cancel.is_cancelled())
            })
            .await;

            let failure = match result {
                Ok((Ok(()), fragments, cancelled)) => {
                    tracing::info!(
                        fragments,
                        cancelled,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "stream generation finished"
                    );
                    return;
                }
                Ok((Err(e), _, _)) => format!("{e:#}"),
                Err(e) => format!("generation task failed: {e}"),
            };
            tracing::error!(error = %failure, "stream generation failed");
            // the consumer may already be gone
            let _ = error_tx
                .send(Err(DispatchError::ModelInference(failure)))
                .await;
        });

        Ok(TokenStream::new(rx, started_rx, cancel, self.config.idle_timeout))
    }
}

impl std::fmt::Debug for GenerationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationDispatcher")
            .field("model_name", &self.model_name)
            .field("config", &self.config)
            .field("streaming", &self.is_streaming())
            .finish()
    }
}

fn strip_marker(text: &str, marker: &str) -> String {
    if marker.is_empty() {
        text.to_string()
    } else {
        text.replace(marker, "")
    }
}

/// Forwards fragments from the engine thread into the stream channel.
struct ChannelSink {
    tx: mpsc::Sender<StreamItem>,
    cancel: CancellationToken,
    marker: String,
    fragments: usize,
}

impl TokenSink for ChannelSink {
    fn emit(&mut self, fragment: &str) -> ControlFlow<()> {
        if self.cancel.is_cancelled() {
            return ControlFlow::Break(());
        }
        let fragment = strip_marker(fragment, &self.marker);
        if fragment.is_empty() {
            return ControlFlow::Continue(());
        }
        match self.tx.blocking_send(Ok(fragment)) {
            Ok(()) => {
                self.fragments += 1;
                ControlFlow::Continue(())
            }
            Err(_) => ControlFlow::Break(()),
        }
    }
}

/// Text fragments of one streaming generation, in generation order.
///
/// Ends when the generation completes. A failure is yielded as the last item. Dropping
/// the stream, even before it is first polled, cancels the generation.
pub struct TokenStream {
    inner: Pin<Box<dyn Stream<Item = StreamItem> + Send>>,
    _cancel_on_drop: DropGuard,
}

impl TokenStream {
    fn new(
        mut rx: mpsc::Receiver<StreamItem>,
        started: oneshot::Receiver<()>,
        cancel: CancellationToken,
        idle_timeout: Duration,
    ) -> Self {
        let guard = cancel.clone().drop_guard();
        let inner = async_stream::stream! {
            // the idle timer starts once the producer holds the model
            if started.await.is_err() {
                if cancel.is_cancelled() {
                    yield Err(DispatchError::Cancelled);
                }
                return;
            }
            loop {
                match tokio::time::timeout(idle_timeout, rx.recv()).await {
                    Ok(Some(item)) => {
                        let failed = item.is_err();
                        yield item;
                        if failed {
                            break;
                        }
                    }
                    Ok(None) => {
                        if cancel.is_cancelled() {
                            yield Err(DispatchError::Cancelled);
                        }
                        break;
                    }
                    Err(_) => {
                        tracing::warn!(?idle_timeout, "stream idle timeout, abandoning generation");
                        cancel.cancel();
                        yield Err(DispatchError::StreamTimeout);
                        break;
                    }
                }
            }
        };
        Self {
            inner: Box::pin(inner),
            _cancel_on_drop: guard,
        }
    }

    /// Plain text for a chunked response body. A failure becomes
    /// [`STREAM_ERROR_SENTINEL`] followed by the error message, and ends the stream.
    pub fn into_text_stream(self) -> impl Stream<Item = String> + Send {
        self.map(|item| match item {
            Ok(fragment) => fragment,
            Err(e) => format!("{STREAM_ERROR_SENTINEL}{e}"),
        })
    }

    /// Drain the stream into one string.
    pub async fn collect_text(mut self) -> Result<String, DispatchError> {
        let mut text = String::new();
        while let Some(item) = self.next().await {
            text.push_str(&item?);
        }
        Ok(text)
    }
}

impl Stream for TokenStream {
    type Item = StreamItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for TokenStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStream").finish_non_exhaustive()
    }
}
