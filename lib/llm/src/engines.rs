// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The generative-model boundary.
//!
//! A [`ModelEngine`] holds mutable per-call state and is not reentrant: the
//! [`crate::dispatcher::GenerationDispatcher`] owns exactly one and serializes every
//! call into it. Engines are synchronous and run on a blocking thread; decoded text is
//! pushed into a [`TokenSink`] as it is produced, which is how streaming and batch
//! generation share one code path.

use std::ops::ControlFlow;

use crate::preprocessor::prompt::Conversation;
use crate::protocols::GenerationArgs;

mod echo;

pub use echo::EchoEngine;

/// Everything one generation call needs. Built fresh per request.
#[derive(Debug)]
pub struct GenerationRequest {
    pub conversation: Conversation,
    pub args: GenerationArgs,
}

/// Receives decoded text fragments in generation order.
pub trait TokenSink: Send {
    /// `Break` asks the engine to stop generating as soon as it can.
    fn emit(&mut self, fragment: &str) -> ControlFlow<()>;
}

pub trait ModelEngine: Send + 'static {
    /// Name reported by the health endpoint.
    fn name(&self) -> &str;

    /// Run one generation to completion, or until `sink` breaks.
    ///
    /// Text may include the end-of-sequence marker; stripping it is the caller's job.
    fn generate(
        &mut self,
        request: &GenerationRequest,
        sink: &mut dyn TokenSink,
    ) -> anyhow::Result<()>;
}

/// Accumulates every fragment. Used by batch generation.
#[derive(Debug, Default)]
pub struct CollectingSink {
    text: String,
    fragments: usize,
}

impl CollectingSink {
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl TokenSink for CollectingSink {
    fn emit(&mut self, fragment: &str) -> ControlFlow<()> {
        self.text.push_str(fragment);
        self.fragments += 1;
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink() {
        let mut sink = CollectingSink::default();
        assert!(sink.emit("Hello ").is_continue());
        assert!(sink.emit("world").is_continue());
        assert_eq!(sink.fragments(), 2);
        assert_eq!(sink.into_text(), "Hello world");
    }
}
