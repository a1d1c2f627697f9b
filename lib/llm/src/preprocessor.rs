// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! The Preprocessor turns a request into model input. It consists of the following modules
//!
//! - `media`: fetches, decodes and rasterizes the image a request refers to.
//! - `prompt`: assembles the conversation and renders it through the chat template.

pub mod media;
pub mod prompt;
