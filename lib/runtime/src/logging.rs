// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Gateway logging.
//!
//! - Configuration loaded from:
//!   1. The `PRISM_LOG` environment variable (highest priority).
//!   2. Optional TOML file pointed to by the `PRISM_LOGGING_CONFIG_PATH` environment variable.
//!
//! Logging can take two forms: `READABLE` or `JSONL`. The default is `READABLE`. `JSONL`
//! can be enabled by setting the `PRISM_LOGGING_JSONL` environment variable to `1`.
//!
//! Filters are comma-separated `target=level` pairs. The default log level is `info`.
//!
//! Example:
//! ```toml
//! log_level = "warn"
//!
//! [log_filters]
//! "prism_llm::dispatcher" = "debug"
//! ```

use std::collections::HashMap;
use std::sync::Once;

use axum::http::Request;
use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, filter::Directive, fmt};

use crate::config::environment_names::logging as env_logging;
use crate::config::{disable_ansi_logging, jsonl_logging_enabled, use_local_timezone};

/// Default log level
const DEFAULT_FILTER_LEVEL: &str = "info";

/// Request id header propagated into the request span
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Once instance to ensure the logger is only initialized once
static INIT: Once = Once::new();

#[derive(Serialize, Deserialize, Debug)]
struct LoggingConfig {
    log_level: String,
    log_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            log_level: DEFAULT_FILTER_LEVEL.to_string(),
            log_filters: HashMap::from([
                ("h2".to_string(), "error".to_string()),
                ("tower".to_string(), "error".to_string()),
                ("hyper_util".to_string(), "error".to_string()),
                ("reqwest".to_string(), "error".to_string()),
                ("rustls".to_string(), "error".to_string()),
                ("axum".to_string(), "error".to_string()),
                ("pdfium_render".to_string(), "error".to_string()),
            ]),
        }
    }
}

/// Initialize the logger. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        if let Err(e) = setup_logging() {
            eprintln!("Failed to initialize logging: {e}");
            std::process::exit(1);
        }
    });
}

fn setup_logging() -> anyhow::Result<()> {
    let filter = filters(load_config()?)?;

    if jsonl_logging_enabled() {
        let l = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_ansi(false)
            .with_timer(TimeFormatter::new())
            .with_writer(std::io::stderr)
            .with_filter(filter);
        tracing_subscriber::registry().with(l).try_init()?;
    } else {
        let l = fmt::layer()
            .with_ansi(!disable_ansi_logging())
            .event_format(fmt::format().compact().with_timer(TimeFormatter::new()))
            .with_writer(std::io::stderr)
            .with_filter(filter);
        tracing_subscriber::registry().with(l).try_init()?;
    }

    Ok(())
}

fn filters(config: LoggingConfig) -> anyhow::Result<EnvFilter> {
    let default_directive: Directive = config.log_level.parse()?;
    let mut filter_layer = EnvFilter::builder()
        .with_default_directive(default_directive)
        .with_env_var(env_logging::PRISM_LOG)
        .from_env_lossy();

    for (module, level) in config.log_filters {
        match format!("{module}={level}").parse::<Directive>() {
            Ok(d) => {
                filter_layer = filter_layer.add_directive(d);
            }
            Err(e) => {
                eprintln!("Failed parsing filter '{level}' for module '{module}': {e}");
            }
        }
    }
    Ok(filter_layer)
}

fn load_config() -> anyhow::Result<LoggingConfig> {
    let mut figment = Figment::new().merge(Serialized::defaults(LoggingConfig::default()));
    if let Some(path) = prism_config::env_var(env_logging::PRISM_LOGGING_CONFIG_PATH) {
        figment = figment.merge(Toml::file(path));
    }
    Ok(figment.extract()?)
}

/// Span for one HTTP request, used with `tower_http::trace::TraceLayer::make_span_with`.
pub fn make_request_span<B>(req: &Request<B>) -> Span {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    tracing::info_span!(
        "http-request",
        method = %req.method(),
        uri = %req.uri(),
        version = ?req.version(),
        x_request_id = request_id,
    )
}

struct TimeFormatter {
    use_local_tz: bool,
}

impl TimeFormatter {
    fn new() -> Self {
        Self {
            use_local_tz: use_local_timezone(),
        }
    }

    fn format_now(&self) -> String {
        if self.use_local_tz {
            chrono::Local::now()
                .format("%Y-%m-%dT%H:%M:%S%.6f%:z")
                .to_string()
        } else {
            chrono::Utc::now()
                .format("%Y-%m-%dT%H:%M:%S%.6fZ")
                .to_string()
        }
    }
}

impl FormatTime for TimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", self.format_now())
    }
}
