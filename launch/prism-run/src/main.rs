// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;

use prism_run::Flags;
use prism_runtime::{CancellationToken, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let flags = Flags::parse();

    let cancel_token = CancellationToken::new();
    tokio::spawn(prism_runtime::cancel_on_shutdown_signal(cancel_token.clone()));

    if let Err(err) = prism_run::run(flags, cancel_token).await {
        tracing::error!("{err:#}");
        return Err(err);
    }
    Ok(())
}
