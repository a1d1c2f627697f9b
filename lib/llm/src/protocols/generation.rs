// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

//
// Hyperparameter Contraints
//

/// Exclusive lower bound for `temperature`; zero would divide logits by zero
pub const MIN_TEMPERATURE_EXCLUSIVE: f32 = 0.0;
/// Maximum allowed value for `temperature`
pub const MAX_TEMPERATURE: f32 = 1.0;

/// Exclusive lower bound for `top_p`
pub const MIN_TOP_P_EXCLUSIVE: f32 = 0.0;
/// Maximum allowed value for `top_p`
pub const MAX_TOP_P: f32 = 1.0;

/// Token budget of the text-only `/complete` item form
pub const DEFAULT_MAX_NEW_TOKENS: i64 = 500;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("`{field}` must be a positive integer, got {value}")]
    NotPositive { field: &'static str, value: i64 },

    #[error("`{field}` must be in (0, 1], got {value}")]
    OutOfRange { field: &'static str, value: f32 },
}

/// Generation parameters of one request.
///
/// Recognized keys are typed and checked by [`GenerationArgs::validate`] before the model
/// is invoked; anything else lands in `extra` and is handed to the engine untouched.
/// Both snake_case and camelCase spellings are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationArgs {
    #[serde(default, alias = "maxLength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,

    #[serde(default, alias = "maxNewTokens", skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<i64>,

    #[serde(default, alias = "topK", skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,

    #[serde(default, alias = "topP", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Absent means deterministic decoding
    #[serde(default, alias = "doSample", skip_serializing_if = "Option::is_none")]
    pub do_sample: Option<bool>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl GenerationArgs {
    /// Greedy decoding bounded to `max_new_tokens`.
    pub fn deterministic(max_new_tokens: i64) -> Self {
        Self {
            max_new_tokens: Some(max_new_tokens),
            do_sample: Some(false),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_positive("max_length", self.max_length)?;
        validate_positive("max_new_tokens", self.max_new_tokens)?;
        validate_positive("top_k", self.top_k)?;
        validate_unit_interval("top_p", self.top_p, MIN_TOP_P_EXCLUSIVE, MAX_TOP_P)?;
        validate_unit_interval(
            "temperature",
            self.temperature,
            MIN_TEMPERATURE_EXCLUSIVE,
            MAX_TEMPERATURE,
        )?;
        Ok(())
    }

    /// Upper bound on generated tokens: `max_new_tokens`, else `max_length`.
    pub fn token_budget(&self) -> Option<usize> {
        self.max_new_tokens
            .or(self.max_length)
            .and_then(|n| usize::try_from(n).ok())
    }

    pub fn is_deterministic(&self) -> bool {
        !self.do_sample.unwrap_or(false)
    }
}

fn validate_positive(field: &'static str, value: Option<i64>) -> Result<(), ValidationError> {
    match value {
        Some(v) if v <= 0 => Err(ValidationError::NotPositive { field, value: v }),
        _ => Ok(()),
    }
}

fn validate_unit_interval(
    field: &'static str,
    value: Option<f32>,
    exclusive_min: f32,
    max: f32,
) -> Result<(), ValidationError> {
    match value {
        // NaN fails both comparisons
        Some(v) if !(v > exclusive_min && v <= max) => {
            Err(ValidationError::OutOfRange { field, value: v })
        }
        _ => Ok(()),
    }
}
