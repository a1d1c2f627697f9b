// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::generation::{DEFAULT_MAX_NEW_TOKENS, GenerationArgs};

/// Where the image evidence of a request comes from. A request carries at most one.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// http(s) or `data:` URL. `page` selects the page when the target is a document.
    RemoteUrl { url: String, page: Option<i64> },

    /// Base64 text, bare or wrapped in a `data:` URL.
    InlineEncoded { data: String, page: Option<i64> },

    /// Raw document bytes already in hand. Only built in process; the wire forms carry
    /// documents as URLs or base64.
    DocumentPage { document: bytes::Bytes, page: i64 },
}

impl ImageSource {
    /// Classify a caller-supplied image reference: http(s) URLs are fetched, anything
    /// else is treated as inline encoded data.
    pub fn from_reference(reference: &str, page: Option<i64>) -> Self {
        let trimmed = reference.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            ImageSource::RemoteUrl {
                url: trimmed.to_string(),
                page,
            }
        } else {
            ImageSource::InlineEncoded {
                data: trimmed.to_string(),
                page,
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ImageSource::RemoteUrl { .. } => "remote_url",
            ImageSource::InlineEncoded { .. } => "inline",
            ImageSource::DocumentPage { .. } => "document_page",
        }
    }
}

/// The `args` object of a `/complete` item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    #[serde(default)]
    pub generation_args: GenerationArgs,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_page: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_image_string: Option<String>,

    /// Any value here asks for the resolved image back; only presence matters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_image_base64: Option<Value>,
}

impl CompletionArgs {
    /// The inline image wins when both an inline image and a URL are given.
    pub fn image_source(&self) -> Option<ImageSource> {
        if let Some(data) = self.base64_image_string.as_deref().filter(|s| !s.is_empty()) {
            return Some(ImageSource::InlineEncoded {
                data: data.to_string(),
                page: self.pdf_page,
            });
        }
        self.file_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|url| ImageSource::RemoteUrl {
                url: url.to_string(),
                page: self.pdf_page,
            })
    }

    pub fn stream_requested(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    pub fn return_image_requested(&self) -> bool {
        self.return_image_base64.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionPayload {
    pub prompt: String,

    #[serde(default)]
    pub args: CompletionArgs,
}

impl CompletionPayload {
    pub fn new(prompt: impl Into<String>, args: CompletionArgs) -> Self {
        Self {
            prompt: prompt.into(),
            args,
        }
    }
}

/// Body of one `/complete` item: the text-only form or the full payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompletionItemBody {
    Text(String),
    Prompt(CompletionPayload),
}

/// `{"data": [...]}`, the envelope of every batch endpoint in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEnvelope<T> {
    pub data: Vec<T>,
}

impl<T> BatchEnvelope<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }
}

/// One unit of work, independent of the endpoint it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Caller-chosen correlation id, echoed back in the result
    pub index: i64,
    pub prompt: String,
    /// Overrides the deployment instruction for this request
    pub system_prompt: Option<String>,
    pub image: Option<ImageSource>,
    pub generation_args: GenerationArgs,
    pub stream: bool,
    pub return_image: bool,
}

impl CompletionRequest {
    pub fn new(index: i64, prompt: impl Into<String>) -> Self {
        Self {
            index,
            prompt: prompt.into(),
            system_prompt: None,
            image: None,
            generation_args: GenerationArgs::default(),
            stream: false,
            return_image: false,
        }
    }

    pub fn from_payload(index: i64, payload: CompletionPayload) -> Self {
        let image = payload.args.image_source();
        Self {
            index,
            prompt: payload.prompt,
            system_prompt: None,
            image,
            stream: payload.args.stream_requested(),
            return_image: payload.args.return_image_requested(),
            generation_args: payload.args.generation_args,
        }
    }

    /// The text-only item form: fixed instruction, greedy decoding, bounded output.
    pub fn text_only(index: i64, prompt: impl Into<String>, system_prompt: &str) -> Self {
        Self {
            system_prompt: Some(system_prompt.to_string()),
            generation_args: GenerationArgs::deterministic(DEFAULT_MAX_NEW_TOKENS),
            ..Self::new(index, prompt)
        }
    }

    pub fn with_image(mut self, image: Option<ImageSource>) -> Self {
        self.image = image;
        self
    }

    pub fn with_generation_args(mut self, args: GenerationArgs) -> Self {
        self.generation_args = args;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// An item that could not be parsed. Only its own result slot fails, unless the index
/// itself is unreadable.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed request item: {reason}")]
pub struct MalformedItem {
    pub index: Option<i64>,
    pub reason: String,
}

/// Parse one `[index, body]` item of `/complete`. `text_system_prompt` is the instruction
/// given to text-only items.
pub fn parse_complete_item(
    item: Value,
    text_system_prompt: &str,
) -> Result<CompletionRequest, MalformedItem> {
    let Value::Array(mut parts) = item else {
        return Err(MalformedItem {
            index: None,
            reason: "expected an [index, request] pair".to_string(),
        });
    };
    let index = parts
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| MalformedItem {
            index: None,
            reason: "item index must be an integer".to_string(),
        })?;
    if parts.len() != 2 {
        return Err(MalformedItem {
            index: Some(index),
            reason: format!("expected 2 elements, got {}", parts.len()),
        });
    }

    let body = parts.pop().unwrap_or(Value::Null);
    match serde_json::from_value::<CompletionItemBody>(body) {
        Ok(CompletionItemBody::Text(prompt)) => Ok(CompletionRequest::text_only(
            index,
            prompt,
            text_system_prompt,
        )),
        Ok(CompletionItemBody::Prompt(payload)) => {
            Ok(CompletionRequest::from_payload(index, payload))
        }
        Err(e) => Err(MalformedItem {
            index: Some(index),
            reason: e.to_string(),
        }),
    }
}

/// `/complete_stream` item: `[prompt, generation_args]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStreamItem(pub String, #[serde(default)] pub GenerationArgs);

/// `/complete_image` item: `[index, prompt, image, generation_args]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageItem(
    pub i64,
    pub String,
    pub String,
    #[serde(default)] pub GenerationArgs,
);

/// `/complete_image_stream` item: `[prompt, image, generation_args]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageStreamItem(pub String, pub String, #[serde(default)] pub GenerationArgs);

/// `/complete_custom` item: `[index, system_prompt, prompt, max_new_tokens, temperature]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomItem(pub i64, pub String, pub String, pub i64, pub f32);

impl From<TextStreamItem> for CompletionRequest {
    fn from(TextStreamItem(prompt, args): TextStreamItem) -> Self {
        CompletionRequest::new(0, prompt)
            .with_generation_args(args)
            .streaming()
    }
}

impl From<ImageItem> for CompletionRequest {
    fn from(ImageItem(index, prompt, image, args): ImageItem) -> Self {
        CompletionRequest::new(index, prompt)
            .with_image(Some(ImageSource::from_reference(&image, None)))
            .with_generation_args(args)
    }
}

impl From<ImageStreamItem> for CompletionRequest {
    fn from(ImageStreamItem(prompt, image, args): ImageStreamItem) -> Self {
        CompletionRequest::new(0, prompt)
            .with_image(Some(ImageSource::from_reference(&image, None)))
            .with_generation_args(args)
            .streaming()
    }
}

impl From<CustomItem> for CompletionRequest {
    fn from(CustomItem(index, system_prompt, prompt, max_new_tokens, temperature): CustomItem) -> Self {
        let args = GenerationArgs {
            max_new_tokens: Some(max_new_tokens),
            temperature: Some(temperature),
            do_sample: Some(false),
            ..Default::default()
        };
        CompletionRequest {
            system_prompt: Some(system_prompt),
            ..CompletionRequest::new(index, prompt).with_generation_args(args)
        }
    }
}
