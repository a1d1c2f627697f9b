// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOutput {
    #[serde(rename = "LLM_OUTPUT_TEXT")]
    pub text: String,

    /// The resolved image as base64 PNG, when the caller asked for it
    #[serde(rename = "base64_image", default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Error marker placed in the result slot of a failed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Stable error name, e.g. `FetchError`
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemBody {
    Failed { error: ItemFailure },
    Completed(CompletionOutput),
}

impl ItemBody {
    pub fn output_text(&self) -> Option<&str> {
        match self {
            ItemBody::Completed(output) => Some(&output.text),
            ItemBody::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&ItemFailure> {
        match self {
            ItemBody::Failed { error } => Some(error),
            ItemBody::Completed(_) => None,
        }
    }
}

/// `[index, body]` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult(pub i64, pub ItemBody);

impl ItemResult {
    pub fn completed(index: i64, output: CompletionOutput) -> Self {
        ItemResult(index, ItemBody::Completed(output))
    }

    pub fn failed(index: i64, error: ItemFailure) -> Self {
        ItemResult(index, ItemBody::Failed { error })
    }

    pub fn index(&self) -> i64 {
        self.0
    }

    pub fn body(&self) -> &ItemBody {
        &self.1
    }
}

/// One entry per input item, carrying the input's index.
pub type BatchResult = Vec<ItemResult>;
