// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::commands::PromptCommand;
use crate::preprocessor::media::{MediaFormat, ResolutionError};
use crate::protocols::{CompletionArgs, CompletionPayload, GenerationArgs};
use crate::storage::{BlobError, BlobStore};

/// Sampling settings a chat user can adjust between turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub max_length: i64,
    pub top_k: i64,
    pub top_p: f32,
    pub temperature: f32,
    pub stream: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_length: 2500,
            top_k: 1,
            top_p: 0.8,
            temperature: 0.8,
            stream: false,
        }
    }
}

impl GenerationSettings {
    pub fn generation_args(&self) -> GenerationArgs {
        GenerationArgs {
            max_length: Some(self.max_length),
            top_k: Some(self.top_k),
            top_p: Some(self.top_p),
            temperature: Some(self.temperature),
            ..Default::default()
        }
    }
}

/// What the next input of the session is taken as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Prompt,
    CollectUrl,
    CollectUpload,
    CollectStageFile,
}

/// Outcome of [`ChatSession::submit`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Send this payload to the gateway
    Send(CompletionPayload),
    AwaitUrl,
    AwaitUpload,
    AwaitStageFile,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session expects {expected:?} input but is in {actual:?} mode")]
    UnexpectedInput {
        expected: SessionMode,
        actual: SessionMode,
    },

    #[error("invalid image URL '{0}'")]
    InvalidUrl(String),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// Request-scoped state of one chat conversation: the generation settings and the image
/// the next prompts refer to.
///
/// Command tokens never produce a payload. They switch the session into a collection
/// mode, and the matching `provide_*` call attaches the image and returns to
/// [`SessionMode::Prompt`].
#[derive(Debug, Clone)]
pub struct ChatSession {
    settings: GenerationSettings,
    mode: SessionMode,
    file_url: Option<String>,
    inline_image: Option<String>,
    pdf_page: Option<i64>,
    return_image: bool,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::with_settings(GenerationSettings::default())
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: GenerationSettings) -> Self {
        Self {
            settings,
            mode: SessionMode::Prompt,
            file_url: None,
            inline_image: None,
            pdf_page: None,
            return_image: false,
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut GenerationSettings {
        &mut self.settings
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn has_image(&self) -> bool {
        self.file_url.is_some() || self.inline_image.is_some()
    }

    /// Ask the gateway to echo the resolved image back with each answer.
    pub fn set_return_image(&mut self, return_image: bool) {
        self.return_image = return_image;
    }

    pub fn clear_image(&mut self) {
        self.file_url = None;
        self.inline_image = None;
        self.pdf_page = None;
    }

    pub fn submit(&mut self, input: &str) -> SessionAction {
        if let Some(command) = PromptCommand::parse(input) {
            tracing::debug!(%command, "collecting image input");
            let (mode, action) = match command {
                PromptCommand::File => (SessionMode::CollectStageFile, SessionAction::AwaitStageFile),
                PromptCommand::Url => (SessionMode::CollectUrl, SessionAction::AwaitUrl),
                PromptCommand::Upload => (SessionMode::CollectUpload, SessionAction::AwaitUpload),
            };
            self.mode = mode;
            return action;
        }

        if self.mode != SessionMode::Prompt {
            tracing::debug!(mode = ?self.mode, "collection abandoned by a new prompt");
            self.mode = SessionMode::Prompt;
        }
        SessionAction::Send(self.payload(input))
    }

    pub fn provide_url(&mut self, url: &str, page: Option<i64>) -> Result<(), SessionError> {
        self.expect_mode(SessionMode::CollectUrl)?;
        let parsed = url::Url::parse(url.trim()).map_err(|_| SessionError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https" | "data") {
            return Err(SessionError::InvalidUrl(url.to_string()));
        }

        self.clear_image();
        self.file_url = Some(parsed.to_string());
        self.pdf_page = page;
        self.mode = SessionMode::Prompt;
        Ok(())
    }

    pub fn provide_upload(
        &mut self,
        bytes: &[u8],
        page: Option<i64>,
    ) -> Result<MediaFormat, SessionError> {
        self.expect_mode(SessionMode::CollectUpload)?;
        let format = self.attach_inline(bytes, page)?;
        self.mode = SessionMode::Prompt;
        Ok(format)
    }

    /// Pull `location` from the stage and attach it inline.
    pub async fn provide_stage_file(
        &mut self,
        store: &dyn BlobStore,
        location: &str,
        page: Option<i64>,
    ) -> Result<MediaFormat, SessionError> {
        self.expect_mode(SessionMode::CollectStageFile)?;
        let bytes = store.fetch_bytes(location).await?;
        let format = self.attach_inline(&bytes, page)?;
        tracing::debug!(location, %format, "attached stage file");
        self.mode = SessionMode::Prompt;
        Ok(format)
    }

    /// Leave a collection mode without attaching anything.
    pub fn cancel_collection(&mut self) {
        self.mode = SessionMode::Prompt;
    }

    fn payload(&self, prompt: &str) -> CompletionPayload {
        let args = CompletionArgs {
            stream: Some(self.settings.stream),
            generation_args: self.settings.generation_args(),
            file_url: self.file_url.clone(),
            pdf_page: self.pdf_page,
            base64_image_string: self.inline_image.clone(),
            return_image_base64: self.return_image.then_some(serde_json::Value::Bool(true)),
        };
        CompletionPayload::new(prompt, args)
    }

    fn attach_inline(&mut self, bytes: &[u8], page: Option<i64>) -> Result<MediaFormat, SessionError> {
        let format = MediaFormat::sniff(bytes)?;
        self.clear_image();
        self.inline_image = Some(base64::engine::general_purpose::STANDARD.encode(bytes));
        self.pdf_page = if format.is_paginated() { page } else { None };
        Ok(format)
    }

    fn expect_mode(&self, expected: SessionMode) -> Result<(), SessionError> {
        if self.mode == expected {
            Ok(())
        } else {
            Err(SessionError::UnexpectedInput {
                expected,
                actual: self.mode,
            })
        }
    }
}
