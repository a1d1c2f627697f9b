// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0

//! Client side of the gateway protocol, as used by a chat front-end.

use anyhow::{Context as _, Result};
use futures::{Stream, StreamExt};
use url::Url;

use super::service::ErrorResponse;
use crate::codec::TextChunkDecoder;
use crate::dispatcher::STREAM_ERROR_SENTINEL;
use crate::protocols::{BatchEnvelope, BatchResult, CompletionItemBody, CompletionPayload};

mod session;

pub use session::{ChatSession, GenerationSettings, SessionAction, SessionError, SessionMode};

#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base_url: Url,
}

impl GatewayClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("invalid gateway URL {base_url}"))?;
        Ok(Self::with_client(reqwest::Client::new(), base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Batch completion through `/complete`. Items are numbered from zero in the given order.
    pub async fn complete(&self, payloads: Vec<CompletionPayload>) -> Result<BatchResult> {
        let response = self
            .post_complete(
                payloads
                    .into_iter()
                    .enumerate()
                    .map(|(index, payload)| (index as i64, CompletionItemBody::Prompt(payload)))
                    .collect(),
            )
            .await?;
        let envelope: BatchEnvelope<_> = response
            .json()
            .await
            .context("gateway returned an unreadable batch result")?;
        Ok(envelope.data)
    }

    /// Streaming completion of a single payload.
    ///
    /// Fragments are decoded as they arrive; a character split across chunks is held until
    /// it completes, and empty or undecodable chunks are dropped as keep-alives. A stream
    /// the gateway ended with a failure yields the output before it, then an error.
    pub async fn stream(
        &self,
        mut payload: CompletionPayload,
    ) -> Result<impl Stream<Item = Result<String>> + Send + use<>> {
        payload.args.stream = Some(true);
        let response = self
            .post_complete(vec![(0, CompletionItemBody::Prompt(payload))])
            .await?;

        let mut bytes = response.bytes_stream();
        Ok(async_stream::try_stream! {
            let mut decoder = TextChunkDecoder::new();
            let mut tail = FailureTail::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.context("gateway stream interrupted")?;
                let text = tail.push(&decoder.push(&chunk));
                if !text.is_empty() {
                    yield text;
                }
            }
            let text = tail.push(&decoder.finish());
            if !text.is_empty() {
                yield text;
            }
            let rest = tail.finish().map_err(|message| {
                anyhow::anyhow!("gateway stream failed: {}", message.trim_end())
            })?;
            if !rest.is_empty() {
                yield rest;
            }
        })
    }

    async fn post_complete(
        &self,
        items: Vec<(i64, CompletionItemBody)>,
    ) -> Result<reqwest::Response> {
        let url = self.base_url.join("complete")?;
        tracing::debug!(%url, items = items.len(), "posting completion batch");

        let response = self
            .client
            .post(url)
            .json(&BatchEnvelope::new(items))
            .send()
            .await
            .context("gateway unreachable")?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match response.json::<ErrorResponse>().await {
            Ok(ErrorResponse { error }) => {
                anyhow::bail!("gateway answered {status}: {}: {}", error.kind, error.message)
            }
            Err(_) => anyhow::bail!("gateway answered {status}"),
        }
    }
}

/// Separates streamed output from the failure report the gateway appends after
/// [`STREAM_ERROR_SENTINEL`]. Text that could be the start of the sentinel is held back
/// until the next fragment settles it.
#[derive(Debug, Default)]
struct FailureTail {
    pending: String,
    failure: Option<String>,
}

impl FailureTail {
    /// Output that is certainly not part of a failure report.
    fn push(&mut self, text: &str) -> String {
        if let Some(failure) = &mut self.failure {
            failure.push_str(text);
            return String::new();
        }
        self.pending.push_str(text);

        if let Some(at) = self.pending.find(STREAM_ERROR_SENTINEL) {
            let report = self.pending.split_off(at);
            self.failure = Some(report[STREAM_ERROR_SENTINEL.len()..].to_string());
            return std::mem::take(&mut self.pending);
        }

        // the sentinel is ASCII, so a matching suffix starts on a char boundary
        let held = (1..STREAM_ERROR_SENTINEL.len())
            .rev()
            .find(|&n| self.pending.ends_with(&STREAM_ERROR_SENTINEL[..n]))
            .unwrap_or(0);
        let ready = self.pending.len() - held;
        self.pending.drain(..ready).collect()
    }

    /// Whatever was held back, or the failure message.
    fn finish(self) -> Result<String, String> {
        match self.failure {
            Some(message) => Err(message),
            None => Ok(self.pending),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocols::CompletionArgs;

    #[tokio::test]
    async fn test_complete_sends_indexed_items() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/complete")
            .match_body(mockito::Matcher::Json(json!({"data": [
                [0, {"prompt": "hello", "args": {"generation_args": {}}}],
                [1, {"prompt": "bye", "args": {"generation_args": {}}}]
            ]})))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"data": [[0, {"LLM_OUTPUT_TEXT": "hi"}], [1, {"error": {"kind": "FetchError", "message": "404"}}]]}"#,
            )
            .create_async()
            .await;

        let client = GatewayClient::new(&server.url()).unwrap();
        let results = client
            .complete(vec![
                CompletionPayload::new("hello", CompletionArgs::default()),
                CompletionPayload::new("bye", CompletionArgs::default()),
            ])
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].body().output_text(), Some("hi"));
        assert_eq!(results[1].body().failure().unwrap().kind, "FetchError");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_stream_decodes_and_filters_fragments() {
        let mut server = mockito::Server::new_async().await;
        // "naïve" with the two-byte character split across chunks
        let body: Vec<Vec<u8>> = vec![
            b"na\xC3".to_vec(),
            Vec::new(),
            b"\xAFve ".to_vec(),
            b"done".to_vec(),
        ];
        let mock = server
            .mock("POST", "/complete")
            .match_body(mockito::Matcher::Json(json!({"data": [
                [0, {"prompt": "tell me", "args": {"stream": true, "generation_args": {}}}]
            ]})))
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_chunked_body(move |w| {
                for chunk in &body {
                    w.write_all(chunk)?;
                }
                Ok(())
            })
            .create_async()
            .await;

        let client = GatewayClient::new(&server.url()).unwrap();
        let stream = client
            .stream(CompletionPayload::new("tell me", CompletionArgs::default()))
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;

        assert!(fragments.iter().all(|f| !f.is_empty()));
        assert_eq!(fragments.concat(), "naïve done");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_stream_failure_split_across_chunks() {
        let mut server = mockito::Server::new_async().await;
        let body: Vec<&'static [u8]> = vec![
            b"partial output\n[PRISM_STR",
            b"EAM_ERROR] model inference failed: device lost",
        ];
        let _mock = server
            .mock("POST", "/complete")
            .with_header("content-type", "text/plain; charset=utf-8")
            .with_chunked_body(move |w| {
                for chunk in &body {
                    w.write_all(chunk)?;
                    w.flush()?;
                }
                Ok(())
            })
            .create_async()
            .await;

        let client = GatewayClient::new(&server.url()).unwrap();
        let items: Vec<Result<String>> = client
            .stream(CompletionPayload::new("tell me", CompletionArgs::default()))
            .await
            .unwrap()
            .collect()
            .await;

        let (last, output) = items.split_last().unwrap();
        let output: String = output.iter().map(|f| f.as_ref().unwrap().as_str()).collect();
        assert_eq!(output, "partial output");
        let err = last.as_ref().unwrap_err().to_string();
        assert_eq!(err, "gateway stream failed: model inference failed: device lost");
    }

    #[test]
    fn test_failure_tail_holds_back_possible_sentinel() {
        let mut tail = FailureTail::default();
        assert_eq!(tail.push("answer\n[PRISM"), "answer");
        // not the sentinel after all
        assert_eq!(tail.push(" notes]"), "\n[PRISM notes]");
        assert_eq!(tail.push("\n"), "");
        assert_eq!(tail.finish(), Ok("\n".to_string()));

        let mut tail = FailureTail::default();
        assert_eq!(tail.push("x\n[PRISM_STREAM_ERROR] boom"), "x");
        assert_eq!(tail.push(" and more"), "");
        assert_eq!(tail.finish(), Err("boom and more".to_string()));
    }

    #[tokio::test]
    async fn test_error_body_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/complete")
            .with_status(409)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error": {"kind": "ConcurrentStreamError", "message": "a stream is already active"}}"#,
            )
            .create_async()
            .await;

        let client = GatewayClient::new(&server.url()).unwrap();
        let err = client
            .stream(CompletionPayload::new("x", CompletionArgs::default()))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("ConcurrentStreamError"));
    }
}
