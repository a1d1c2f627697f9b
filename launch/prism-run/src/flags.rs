// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use prism_runtime::GatewayConfig;
use validator::Validate as _;

use crate::opt::Output;

/// Every flag left unset keeps the value loaded from `PRISM_*` variables or the
/// `PRISM_CONFIG_PATH` file.
#[derive(Parser, Debug, Clone)]
#[command(version, about = "Prism multimodal completion gateway", long_about = None)]
pub struct Flags {
    /// Engine to serve: echo
    #[arg(long = "out", env = "PRISM_ENGINE", default_value = "echo")]
    pub out: String,

    /// Model identifier, hub repo id or local path
    #[arg(long)]
    pub model_id: Option<String>,

    /// HTTP interface to bind
    #[arg(long)]
    pub http_host: Option<String>,

    /// HTTP port to listen on
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Fixed system instruction prepended to every conversation
    #[arg(long)]
    pub system_prompt: Option<String>,

    /// Seconds to wait for the next streamed fragment before giving up
    #[arg(long)]
    pub stream_idle_timeout_secs: Option<u64>,

    /// Buffered fragments between the model and a streaming response
    #[arg(long)]
    pub stream_channel_capacity: Option<usize>,

    /// Directory holding the pdfium shared library
    #[arg(long)]
    pub pdfium_library_path: Option<PathBuf>,

    /// Allow image URLs whose host is an IP address
    #[arg(long)]
    pub allow_direct_ip: bool,

    /// Allow image URLs with an explicit port
    #[arg(long)]
    pub allow_direct_port: bool,

    /// Jinja chat template file. The built-in template is used when unset.
    #[arg(long)]
    pub chat_template: Option<PathBuf>,

    /// Per-token delay of the echo engine, in milliseconds
    #[arg(long, env = "PRISM_TOKEN_ECHO_DELAY_MS", default_value_t = 0)]
    pub token_echo_delay_ms: u64,
}

impl Flags {
    pub fn output(&self) -> anyhow::Result<Output> {
        Output::try_from(self.out.as_str())
    }

    pub fn token_echo_delay(&self) -> Duration {
        Duration::from_millis(self.token_echo_delay_ms)
    }

    /// Lay the flags over `config` and validate the result.
    pub fn apply(&self, mut config: GatewayConfig) -> anyhow::Result<GatewayConfig> {
        if let Some(model_id) = &self.model_id {
            config.model_id = Some(model_id.clone());
        }
        if let Some(host) = &self.http_host {
            config.http_host = host.clone();
        }
        if let Some(port) = self.http_port {
            config.http_port = port;
        }
        if let Some(system_prompt) = &self.system_prompt {
            config.system_prompt = Some(system_prompt.clone());
        }
        if let Some(secs) = self.stream_idle_timeout_secs {
            config.stream_idle_timeout_secs = secs;
        }
        if let Some(capacity) = self.stream_channel_capacity {
            config.stream_channel_capacity = capacity;
        }
        if let Some(path) = &self.pdfium_library_path {
            config.pdfium_library_path = Some(path.clone());
        }
        config.allow_direct_ip |= self.allow_direct_ip;
        config.allow_direct_port |= self.allow_direct_port;

        config
            .validate()
            .context("invalid gateway configuration after applying flags")?;
        Ok(config)
    }
}
