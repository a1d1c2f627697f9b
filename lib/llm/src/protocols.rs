// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! # Prism Protocols
//!
//! This module contains the protocols, i.e. messages formats, used to exchange requests and responses
//! with callers of the HTTP API, and the endpoint-independent [`CompletionRequest`] the rest of the
//! gateway works on.
//!

pub mod generation;
pub mod request;
pub mod response;

pub use generation::{GenerationArgs, ValidationError};
pub use request::{
    BatchEnvelope, CompletionArgs, CompletionItemBody, CompletionPayload, CompletionRequest,
    CustomItem, ImageItem, ImageSource, ImageStreamItem, MalformedItem, TextStreamItem,
    parse_complete_item,
};
pub use response::{BatchResult, CompletionOutput, ItemBody, ItemFailure, ItemResult};
