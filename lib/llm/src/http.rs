// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! HTTP surface of the gateway: the axum [`service`] and the reqwest [`client`] that
//! speaks the same protocol.

pub mod client;
pub mod service;
