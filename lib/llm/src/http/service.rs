// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! HTTP Service
//!
//! One process serves one model. Endpoints:
//!
//! | Method | Path | Body |
//! |---|---|---|
//! | POST | `/complete` | `{"data": [[index, {"prompt", "args"}] or [index, "prompt"], ...]}` |
//! | POST | `/complete_stream` | `{"data": [[prompt, generation_args]]}` |
//! | POST | `/complete_image` | `{"data": [[index, prompt, image, generation_args], ...]}` |
//! | POST | `/complete_image_stream` | `{"data": [[prompt, image, generation_args]]}` |
//! | POST | `/complete_custom` | `{"data": [[index, system_prompt, prompt, max_new_tokens, temperature], ...]}` |
//! | GET | `/health`, `/live` | |
//!
//! Streaming endpoints answer with chunked `text/plain`. Errors raised before the first
//! byte is sent get a JSON error body and a status from [`GatewayError::status_code`];
//! errors after that end the body with [`crate::dispatcher::STREAM_ERROR_SENTINEL`].
//!
//! [`GatewayError::status_code`]: crate::error::GatewayError::status_code

use std::fmt;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use derive_builder::Builder;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use prism_runtime::config::{DEFAULT_HTTP_PORT, DEFAULT_MAX_REQUEST_BYTES};

use crate::preprocessor::prompt::DEFAULT_SYSTEM_PROMPT;
use crate::router::RequestBatchRouter;

mod complete;
mod error;
mod health;

pub use complete::SKIPPED_INDICES_HEADER;
pub use error::ErrorResponse;

/// Method and path of a mounted route, logged at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDoc {
    method: Method,
    path: String,
}

impl RouteDoc {
    pub fn new<T: Into<String>>(method: Method, path: T) -> Self {
        RouteDoc {
            method,
            path: path.into(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for RouteDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Shared with every request handler.
pub struct State {
    router: Arc<RequestBatchRouter>,
    model_id: Option<String>,
    text_system_prompt: String,
}

impl State {
    pub fn router(&self) -> &RequestBatchRouter {
        Arc::as_ref(&self.router)
    }

    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    /// Instruction given to text-only `/complete` items
    pub fn text_system_prompt(&self) -> &str {
        &self.text_system_prompt
    }
}

#[derive(Clone)]
pub struct HttpService {
    // The state we share with every request handler
    state: Arc<State>,

    app: Router,
    port: u16,
    host: String,
    route_docs: Vec<RouteDoc>,
}

#[derive(Builder)]
#[builder(pattern = "owned", build_fn(private, name = "build_internal"))]
pub struct HttpServiceConfig {
    #[builder(default = "DEFAULT_HTTP_PORT")]
    port: u16,

    #[builder(setter(into), default = "String::from(\"0.0.0.0\")")]
    host: String,

    router: Arc<RequestBatchRouter>,

    #[builder(default = "DEFAULT_MAX_REQUEST_BYTES")]
    max_request_bytes: usize,

    #[builder(setter(into, strip_option), default)]
    model_id: Option<String>,

    #[builder(setter(into), default = "DEFAULT_SYSTEM_PROMPT.to_string()")]
    text_system_prompt: String,
}

impl HttpService {
    pub fn builder() -> HttpServiceConfigBuilder {
        HttpServiceConfigBuilder::default()
    }

    pub fn state_clone(&self) -> Arc<State> {
        self.state.clone()
    }

    pub fn state(&self) -> &State {
        Arc::as_ref(&self.state)
    }

    /// The complete axum application, for serving on a caller-owned listener.
    pub fn app(&self) -> Router {
        self.app.clone()
    }

    pub fn route_docs(&self) -> &[RouteDoc] {
        &self.route_docs
    }

    pub async fn spawn(&self, cancel_token: CancellationToken) -> JoinHandle<Result<()>> {
        let this = self.clone();
        tokio::spawn(async move { this.run(cancel_token).await })
    }

    pub async fn run(&self, cancel_token: CancellationToken) -> Result<()> {
        let address = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("failed to bind HTTP service to {address}"))?;
        self.serve(listener, cancel_token).await
    }

    /// Serve on an already bound listener until `cancel_token` fires.
    pub async fn serve(&self, listener: TcpListener, cancel_token: CancellationToken) -> Result<()> {
        let address = listener.local_addr()?;
        tracing::info!(%address, "Starting HTTP service on: {address}");
        for route in &self.route_docs {
            tracing::debug!(%route, "route");
        }

        let observer = cancel_token.child_token();
        axum::serve(listener, self.app.clone())
            .with_graceful_shutdown(observer.cancelled_owned())
            .await
            .inspect_err(|_| cancel_token.cancel())?;

        Ok(())
    }
}

impl HttpServiceConfigBuilder {
    pub fn build(self) -> Result<HttpService, anyhow::Error> {
        let config: HttpServiceConfig = self.build_internal()?;

        let state = Arc::new(State {
            router: config.router,
            model_id: config.model_id,
            text_system_prompt: config.text_system_prompt,
        });

        let mut route_docs = Vec::new();
        let mut app = Router::new();
        for (docs, route) in [
            complete::completion_router(state.clone()),
            health::health_check_router(state.clone(), None),
            health::live_check_router(state.clone(), None),
        ] {
            route_docs.extend(docs);
            app = app.merge(route);
        }

        let app = app
            .layer(DefaultBodyLimit::max(config.max_request_bytes))
            .layer(
                TraceLayer::new_for_http().make_span_with(
                    prism_runtime::logging::make_request_span::<axum::body::Body>,
                ),
            );

        Ok(HttpService {
            state,
            app,
            port: config.port,
            host: config.host,
            route_docs,
        })
    }
}
