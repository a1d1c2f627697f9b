// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # Prism LLM
//!
//! A multimodal completion gateway in front of a single generative model. Requests carry
//! a prompt and at most one image (remote URL, inline base64, or a page of a document);
//! the gateway resolves the image, assembles the conversation, and answers in batch or
//! as a chunked text stream.
//!
//! The pipeline is [`router::RequestBatchRouter`] → [`preprocessor`] →
//! [`dispatcher::GenerationDispatcher`] → [`engines::ModelEngine`], served over HTTP by
//! [`http::service::HttpService`].

pub mod codec;
pub mod commands;
pub mod dispatcher;
pub mod engines;
pub mod error;
pub mod http;
pub mod preprocessor;
pub mod protocols;
pub mod router;
pub mod storage;
