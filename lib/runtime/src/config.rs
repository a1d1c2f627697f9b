// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use derive_builder::Builder;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use prism_config::{env_is_truthy, env_var};

pub mod environment_names;

use environment_names::{gateway, legacy, logging as env_logging};

/// Default HTTP port, same as the model-serving containers this gateway replaces
pub const DEFAULT_HTTP_PORT: u16 = 9000;

const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

const DEFAULT_MODEL_CACHE_DIR: &str = "/llm_models";

/// Longest wait for the next streamed fragment before the generation is abandoned
pub const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 5;

pub const DEFAULT_STREAM_CHANNEL_CAPACITY: usize = 64;

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Marker the model emits at the end of a generation
pub const DEFAULT_END_OF_SEQUENCE_MARKER: &str = "<|endoftext|>";

/// Request bodies carry inline base64 images, so the axum default of 2MB is too small
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024;

/// Process-wide gateway settings. Loaded once at start-up, immutable afterwards.
#[derive(Serialize, Deserialize, Validate, Debug, Clone, Builder)]
#[builder(pattern = "owned", default, setter(into), build_fn(private, name = "build_internal"))]
pub struct GatewayConfig {
    /// Model identifier (hub repo id or local path)
    pub model_id: Option<String>,

    /// Where model weights are cached. Read by weight-loading engines; the echo engine
    /// has no weights.
    pub model_cache_dir: PathBuf,

    /// Number of accelerator devices the model may use. Unused by the echo engine.
    #[validate(range(min = 1))]
    pub accelerator_count: Option<u32>,

    pub http_host: String,

    pub http_port: u16,

    /// Capacity of the bounded channel between the generating task and the HTTP stream
    #[validate(range(min = 1, max = 65536))]
    pub stream_channel_capacity: usize,

    #[validate(range(min = 1, max = 3600))]
    pub stream_idle_timeout_secs: u64,

    #[validate(range(min = 1, max = 600))]
    pub fetch_timeout_secs: u64,

    /// Fixed system instruction prepended to every conversation, if set
    pub system_prompt: Option<String>,

    #[validate(length(min = 1))]
    pub end_of_sequence_marker: String,

    #[validate(range(min = 1024))]
    pub max_request_bytes: usize,

    /// Directory holding the pdfium shared library; the system library is used when unset
    pub pdfium_library_path: Option<PathBuf>,

    /// Permit image URLs whose host is a literal IP address
    pub allow_direct_ip: bool,

    /// Permit image URLs with an explicit port
    pub allow_direct_port: bool,

    pub max_image_width: Option<u32>,

    pub max_image_height: Option<u32>,

    pub max_image_alloc_bytes: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            model_id: None,
            model_cache_dir: PathBuf::from(DEFAULT_MODEL_CACHE_DIR),
            accelerator_count: None,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            stream_channel_capacity: DEFAULT_STREAM_CHANNEL_CAPACITY,
            stream_idle_timeout_secs: DEFAULT_STREAM_IDLE_TIMEOUT_SECS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            system_prompt: None,
            end_of_sequence_marker: DEFAULT_END_OF_SEQUENCE_MARKER.to_string(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            pdfium_library_path: None,
            allow_direct_ip: false,
            allow_direct_port: false,
            max_image_width: None,
            max_image_height: None,
            max_image_alloc_bytes: None,
        }
    }
}

impl fmt::Display for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "model_id={}",
            self.model_id.as_deref().unwrap_or("<unset>")
        )?;
        write!(f, ", model_cache_dir={}", self.model_cache_dir.display())?;
        write!(f, ", http={}:{}", self.http_host, self.http_port)?;
        write!(
            f,
            ", stream_channel_capacity={}",
            self.stream_channel_capacity
        )?;
        write!(
            f,
            ", stream_idle_timeout_secs={}",
            self.stream_idle_timeout_secs
        )?;
        write!(f, ", fetch_timeout_secs={}", self.fetch_timeout_secs)?;
        write!(f, ", system_prompt={}", self.system_prompt.is_some())?;

        Ok(())
    }
}

impl GatewayConfig {
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Layering, lowest priority first: defaults, legacy variables (`HUGGINGFACE_MODEL`,
    /// `HF_HOME`), the TOML file named by `PRISM_CONFIG_PATH`, then `PRISM_*` variables.
    /// Empty variables are ignored.
    pub(crate) fn figment() -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(GatewayConfig::default()))
            .merge(Env::raw().filter_map(|k| {
                let mapped_key = if k.as_str().eq_ignore_ascii_case(legacy::HUGGINGFACE_MODEL) {
                    "model_id"
                } else if k.as_str().eq_ignore_ascii_case(legacy::HF_HOME) {
                    "model_cache_dir"
                } else {
                    return None;
                };
                env_var(k.as_str()).map(|_| mapped_key.into())
            }));

        if let Some(path) = env_var(gateway::PRISM_CONFIG_PATH) {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(gateway::PRISM_PREFIX).filter_map(|k| {
            let full_key = format!("{}{}", gateway::PRISM_PREFIX, k.as_str());
            // filters out empty environment variables
            env_var(&full_key).map(|_| k.into())
        }))
    }

    /// Load and validate the configuration.
    pub fn from_settings() -> Result<GatewayConfig> {
        let config: GatewayConfig = Self::figment()
            .extract()
            .context("failed to load gateway configuration")?;
        config
            .validate()
            .context("gateway configuration is invalid")?;
        Ok(config)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl GatewayConfigBuilder {
    /// Build and validate
    pub fn build(self) -> Result<GatewayConfig> {
        let config = self.build_internal()?;
        config.validate()?;
        Ok(config)
    }
}

/// Check if JSONL logging is enabled
pub fn jsonl_logging_enabled() -> bool {
    env_is_truthy(env_logging::PRISM_LOGGING_JSONL)
}

/// Check if ANSI terminal colors should be disabled
pub fn disable_ansi_logging() -> bool {
    env_is_truthy(env_logging::PRISM_SDK_DISABLE_ANSI_LOGGING)
}

/// Check if logging should use the local timezone
pub fn use_local_timezone() -> bool {
    env_is_truthy(env_logging::PRISM_LOG_USE_LOCAL_TZ)
}
