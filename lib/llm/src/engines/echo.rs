// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::ops::ControlFlow;
use std::time::Duration;

use super::{GenerationRequest, ModelEngine, TokenSink};
use crate::preprocessor::prompt::ChatTemplate;

/// Echos the prompt back as the response, one whitespace-delimited word per token.
///
/// Deterministic regardless of sampling arguments, so a streamed run and a batch run of
/// the same request produce the same text. When the user turn carries an image its size
/// is reported first, as `[image WxH] `.
#[derive(Debug)]
pub struct EchoEngine {
    template: ChatTemplate,
    token_delay: Option<Duration>,
    end_of_sequence_marker: String,
}

impl EchoEngine {
    pub fn new(template: ChatTemplate, end_of_sequence_marker: impl Into<String>) -> Self {
        Self {
            template,
            token_delay: None,
            end_of_sequence_marker: end_of_sequence_marker.into(),
        }
    }

    /// Sleep this long before every token, to make streaming observable.
    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = (!delay.is_zero()).then_some(delay);
        self
    }
}

impl ModelEngine for EchoEngine {
    fn name(&self) -> &str {
        "echo"
    }

    fn generate(
        &mut self,
        request: &GenerationRequest,
        sink: &mut dyn TokenSink,
    ) -> anyhow::Result<()> {
        let rendered = self.template.render(&request.conversation, true)?;
        tracing::debug!(prompt = %rendered, "rendered chat template");

        let Some(user) = request.conversation.last_user_turn() else {
            anyhow::bail!("conversation has no user turn");
        };

        let image_note = user
            .image()
            .map(|image| format!("[image {}x{}] ", image.width(), image.height()));
        let tokens = image_note
            .iter()
            .map(String::as_str)
            .chain(user.text().split_inclusive(char::is_whitespace));

        let budget = request.args.token_budget().unwrap_or(usize::MAX);
        for token in tokens.take(budget) {
            if let Some(delay) = self.token_delay {
                std::thread::sleep(delay);
            }
            if sink.emit(token).is_break() {
                tracing::debug!("echo generation stopped by consumer");
                return Ok(());
            }
        }

        if let ControlFlow::Break(()) = sink.emit(&self.end_of_sequence_marker) {
            tracing::debug!("consumer left before end of sequence");
        }
        Ok(())
    }
}
