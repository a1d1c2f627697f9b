// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Byte fetch by location, for documents and images a chat session picks from a stage.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("invalid blob location '{0}'")]
    InvalidLocation(String),

    #[error("blob store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn fetch_bytes(&self, location: &str) -> Result<Bytes, BlobError>;
}

/// Stage rooted at a local directory.
///
/// Locations are relative to the root; a leading `@` (stage notation) and leading slashes
/// are ignored. Locations that would leave the root are rejected.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, location: &str) -> Result<PathBuf, BlobError> {
        let relative = location.trim().trim_start_matches('@').trim_start_matches('/');
        if relative.is_empty() {
            return Err(BlobError::InvalidLocation(location.to_string()));
        }
        let relative = Path::new(relative);
        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(BlobError::InvalidLocation(location.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for FileBlobStore {
    async fn fetch_bytes(&self, location: &str) -> Result<Bytes, BlobError> {
        let path = self.resolve(location)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                tracing::debug!(path = %path.display(), len = bytes.len(), "fetched blob");
                Ok(Bytes::from(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(location.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory stage, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, location: impl Into<String>, bytes: impl Into<Bytes>) {
        self.blobs.lock().insert(location.into(), bytes.into());
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn fetch_bytes(&self, location: &str) -> Result<Bytes, BlobError> {
        self.blobs
            .lock()
            .get(location)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(location.to_string()))
    }
}
