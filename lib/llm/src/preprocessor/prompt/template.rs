// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use minijinja::{Environment, ErrorKind, Value, context};
use serde::Serialize;

use super::{Conversation, Role};

const TEMPLATE_NAME: &str = "chat";

/// Generic turn markup with an `<|image|>` placeholder ahead of the text of any turn
/// that carries an image.
pub const DEFAULT_CHAT_TEMPLATE: &str = "{% for message in messages %}<|{{ message.role }}|>\n{% if message.image %}<|image|>{% endif %}{{ message.content }}\n{% endfor %}{% if add_generation_prompt %}<|assistant|>\n{% endif %}";

/// Renders a [`Conversation`] into model input text.
pub struct ChatTemplate {
    env: Environment<'static>,
}

#[derive(Serialize)]
struct MessageView<'a> {
    role: Role,
    content: &'a str,
    image: bool,
}

fn raise_exception(msg: String) -> Result<String, minijinja::Error> {
    Err(minijinja::Error::new(ErrorKind::InvalidOperation, msg))
}

impl ChatTemplate {
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let mut env = Environment::new();
        env.set_lstrip_blocks(true);
        env.set_trim_blocks(true);
        env.add_function("raise_exception", raise_exception);
        env.add_template_owned(TEMPLATE_NAME, source.into())
            .context("invalid chat template")?;
        Ok(Self { env })
    }

    pub fn render(&self, conversation: &Conversation, add_generation_prompt: bool) -> Result<String> {
        let messages: Vec<MessageView<'_>> = conversation
            .turns()
            .iter()
            .map(|turn| MessageView {
                role: turn.role(),
                content: turn.text(),
                image: turn.image().is_some(),
            })
            .collect();

        let template = self.env.get_template(TEMPLATE_NAME)?;
        let rendered = template.render(context! {
            messages => Value::from_serialize(&messages),
            add_generation_prompt => add_generation_prompt,
        })?;
        Ok(rendered)
    }
}

impl Default for ChatTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_CHAT_TEMPLATE).unwrap_or_else(|e| unreachable!("built-in template: {e}"))
    }
}

impl std::fmt::Debug for ChatTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatTemplate").finish_non_exhaustive()
    }
}
