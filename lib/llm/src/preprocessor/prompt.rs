// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Prompt Assembly Module
//!
//! Builds the structured conversation handed to a model engine:
//! - An optional system turn, when the deployment or the request supplies one
//! - One user turn carrying the prompt text and, optionally, the resolved image
//!
//! Rendering the conversation into model text (special tokens, image placeholders) is
//! done by [`ChatTemplate`] at the engine boundary, not here.

use serde::Serialize;

use super::media::ResolvedImage;

mod template;

pub use template::{ChatTemplate, DEFAULT_CHAT_TEMPLATE};

/// System instruction used by the text-only `/complete` item form
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful digital assistant. Please provide safe, ethical and accurate information to the user.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug)]
pub struct Turn {
    role: Role,
    text: String,
    image: Option<ResolvedImage>,
}

impl Turn {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn image(&self) -> Option<&ResolvedImage> {
        self.image.as_ref()
    }
}

/// Ordered turns for one request. Immutable once built; the attached image is owned by
/// the conversation and dropped with it.
#[derive(Debug)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.turns
            .iter()
            .find(|t| t.role == Role::System)
            .map(Turn::text)
    }

    pub fn last_user_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::User)
    }

    pub fn image(&self) -> Option<&ResolvedImage> {
        self.turns.iter().find_map(Turn::image)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    system_prompt: Option<String>,
}

impl PromptAssembler {
    /// `system_prompt` is the deployment-wide instruction, if any.
    pub fn new(system_prompt: Option<String>) -> Self {
        Self {
            system_prompt: system_prompt.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn assemble(&self, prompt: &str, image: Option<ResolvedImage>) -> Conversation {
        self.assemble_with_system(self.system_prompt.as_deref(), prompt, image)
    }

    /// Like [`Self::assemble`] with a per-request system instruction in place of the
    /// deployment one. An empty instruction means no system turn.
    pub fn assemble_with_system(
        &self,
        system_prompt: Option<&str>,
        prompt: &str,
        image: Option<ResolvedImage>,
    ) -> Conversation {
        let mut turns = Vec::with_capacity(2);
        if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
            turns.push(Turn {
                role: Role::System,
                text: system.to_string(),
                image: None,
            });
        }
        turns.push(Turn {
            role: Role::User,
            text: prompt.to_string(),
            image,
        });
        Conversation { turns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessor::media::MediaFormat;
    use image::{DynamicImage, RgbImage};

    fn tiny_image() -> ResolvedImage {
        ResolvedImage::new(DynamicImage::ImageRgb8(RgbImage::new(2, 2)), MediaFormat::Png)
    }

    #[test]
    fn test_single_turn_without_system() {
        let conversation = PromptAssembler::default().assemble("What is shown?", None);
        assert_eq!(conversation.turns().len(), 1);
        assert_eq!(conversation.turns()[0].role(), Role::User);
        assert_eq!(conversation.system_prompt(), None);
        assert!(conversation.image().is_none());
    }

    #[test]
    fn test_image_rides_on_user_turn() {
        let assembler = PromptAssembler::new(Some("Be terse.".to_string()));
        let conversation = assembler.assemble("Describe the chart", Some(tiny_image()));

        assert_eq!(conversation.turns().len(), 2);
        assert_eq!(conversation.system_prompt(), Some("Be terse."));
        let user = conversation.last_user_turn().unwrap();
        assert_eq!(user.text(), "Describe the chart");
        assert_eq!(user.image().map(|i| i.width()), Some(2));
        assert!(conversation.turns()[0].image().is_none());
    }

    #[test]
    fn test_request_system_prompt_overrides_deployment() {
        let assembler = PromptAssembler::new(Some("deployment".to_string()));
        let conversation = assembler.assemble_with_system(Some("request"), "hi", None);
        assert_eq!(conversation.system_prompt(), Some("request"));

        let conversation = assembler.assemble_with_system(Some("  "), "hi", None);
        assert_eq!(conversation.turns().len(), 1);
    }

    #[test]
    fn test_blank_deployment_prompt_is_ignored() {
        let conversation = PromptAssembler::new(Some(String::new())).assemble("hi", None);
        assert_eq!(conversation.system_prompt(), None);
    }
}
