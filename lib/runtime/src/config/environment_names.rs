// SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Environment variable names read by the gateway, grouped by concern.
//!
//! Every `GatewayConfig` field can also be set as `PRISM_<FIELD_NAME>`; only the names
//! referenced directly in code are listed here.

/// Logging and tracing
pub mod logging {
    /// Filter directives, `EnvFilter` syntax (e.g. "info,prism_llm=debug")
    pub const PRISM_LOG: &str = "PRISM_LOG";

    /// Optional TOML file with `log_level` and `[log_filters]`
    pub const PRISM_LOGGING_CONFIG_PATH: &str = "PRISM_LOGGING_CONFIG_PATH";

    /// Emit one JSON object per line instead of the compact readable format
    pub const PRISM_LOGGING_JSONL: &str = "PRISM_LOGGING_JSONL";

    /// Disable ANSI terminal colors in logs
    pub const PRISM_SDK_DISABLE_ANSI_LOGGING: &str = "PRISM_SDK_DISABLE_ANSI_LOGGING";

    /// Use local timezone for logging timestamps (default is UTC)
    pub const PRISM_LOG_USE_LOCAL_TZ: &str = "PRISM_LOG_USE_LOCAL_TZ";
}

/// Gateway settings
pub mod gateway {
    /// Prefix for every `GatewayConfig` field
    pub const PRISM_PREFIX: &str = "PRISM_";

    /// Optional TOML file layered between defaults and the environment
    pub const PRISM_CONFIG_PATH: &str = "PRISM_CONFIG_PATH";

    pub const PRISM_MODEL_ID: &str = "PRISM_MODEL_ID";
    pub const PRISM_MODEL_CACHE_DIR: &str = "PRISM_MODEL_CACHE_DIR";
    pub const PRISM_ACCELERATOR_COUNT: &str = "PRISM_ACCELERATOR_COUNT";
    pub const PRISM_HTTP_PORT: &str = "PRISM_HTTP_PORT";
    pub const PRISM_STREAM_IDLE_TIMEOUT_SECS: &str = "PRISM_STREAM_IDLE_TIMEOUT_SECS";
    pub const PRISM_STREAM_CHANNEL_CAPACITY: &str = "PRISM_STREAM_CHANNEL_CAPACITY";
    pub const PRISM_SYSTEM_PROMPT: &str = "PRISM_SYSTEM_PROMPT";
}

/// Names honoured for compatibility with existing model-serving deployments
pub mod legacy {
    /// Model identifier, used when `PRISM_MODEL_ID` is not set
    pub const HUGGINGFACE_MODEL: &str = "HUGGINGFACE_MODEL";

    /// Model cache directory, used when `PRISM_MODEL_CACHE_DIR` is not set
    pub const HF_HOME: &str = "HF_HOME";
}
