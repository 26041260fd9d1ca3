//! Streaming relays between the browser and the upstream providers
//!
//! Each relay issues one upstream request per caller request and hands the
//! response body to a pump task. The pump reads upstream chunks, decodes them
//! into caller items and pushes those into a bounded channel, so a slow
//! caller stops the pump from reading further upstream data.
//!
//! ```text
//! upstream body ──► pump task ──► mpsc (bounded) ──► RelayStream::next() ──► HTTP body
//! ```
//!
//! The pump stops as soon as the receiving side is dropped, which drops the
//! upstream response and releases its connection.

pub mod commentary;
pub mod speech;
pub mod sse;

use std::pin::{Pin, pin};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Upstream;
use crate::{Error, Result};

pub use commentary::{Commentary, CommentaryRelay, CommentaryRequest, CommentarySettings};
pub use speech::{
    SpeechRelay, SpeechRequest, SpeechSettings, collect_audio, encode_data_url, save_audio,
};

/// Longest upstream error body excerpt written to logs
const MAX_LOGGED_BODY: usize = 512;

/// Default cap on a single buffered event line (1 MiB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Transport settings shared by both relays
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Time allowed to establish the upstream connection
    pub connect_timeout: Duration,

    /// Longest wait for response headers or for the next body chunk
    pub read_timeout: Duration,

    /// Capacity of the channel between pump and caller
    pub channel_capacity: usize,

    /// Longest unterminated event line buffered before giving up
    pub max_line_bytes: usize,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            channel_capacity: 32,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

/// Build the HTTP client shared by the relays
///
/// # Errors
///
/// Returns error if the TLS backend cannot be initialised
pub fn http_client(settings: &UpstreamSettings) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .user_agent(concat!("quip-gateway/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Pull-based stream of relayed items
///
/// Yields `Ok(item)` in upstream order, then either ends (`None`) after a
/// clean upstream end or yields one `Err(Error::StreamInterrupted)` and ends.
/// The stream is forward-only and cannot be restarted.
#[derive(Debug)]
pub struct RelayStream<T> {
    inner: ReceiverStream<Result<T>>,
}

impl<T> RelayStream<T> {
    fn new(rx: mpsc::Receiver<Result<T>>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Wait for the next item
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.inner.next().await
    }
}

impl<T> Stream for RelayStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Stream of text fragments from the commentary relay
pub type FragmentStream = RelayStream<String>;

/// Stream of MP3 byte chunks from the speech relay
pub type AudioStream = RelayStream<Bytes>;

/// Whether the pump should keep reading after a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    /// More upstream data expected
    Continue,
    /// The upstream signalled its end; nothing after it is read
    Done,
}

/// Turns raw upstream chunks into caller items
pub(crate) trait ChunkDecoder: Send + 'static {
    type Item: Send + 'static;

    /// Decode one upstream chunk, appending any complete items to `out`
    ///
    /// An `Err` carries the reason the stream cannot continue; items already
    /// in `out` are still delivered before the interruption.
    fn decode(
        &mut self,
        chunk: Bytes,
        out: &mut Vec<Self::Item>,
    ) -> std::result::Result<Progress, String>;

    /// Flush whatever is left once the upstream body ended cleanly
    fn finish(&mut self, out: &mut Vec<Self::Item>);
}

/// Passes every chunk through untouched
#[derive(Debug, Default)]
pub(crate) struct Passthrough;

impl ChunkDecoder for Passthrough {
    type Item = Bytes;

    fn decode(
        &mut self,
        chunk: Bytes,
        out: &mut Vec<Bytes>,
    ) -> std::result::Result<Progress, String> {
        if !chunk.is_empty() {
            out.push(chunk);
        }
        Ok(Progress::Continue)
    }

    fn finish(&mut self, _out: &mut Vec<Bytes>) {}
}

/// Issue an upstream request and check its status
///
/// Anything that fails here happens before the caller has seen output, so it
/// is reported as [`Error::Upstream`].
pub(crate) async fn send_upstream(
    service: Upstream,
    request: reqwest::RequestBuilder,
    read_timeout: Duration,
) -> Result<reqwest::Response> {
    let response = match tokio::time::timeout(read_timeout, request.send()).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(%service, phase = "connect", error = %e, "upstream request failed");
            return Err(Error::Upstream {
                service,
                status: e.status().map(|s| s.as_u16()),
                message: "upstream request failed".to_string(),
            });
        }
        Err(_) => {
            tracing::error!(
                %service,
                phase = "connect",
                timeout_ms = read_timeout.as_millis(),
                "upstream did not respond in time"
            );
            return Err(Error::Upstream {
                service,
                status: None,
                message: "upstream timed out".to_string(),
            });
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = tokio::time::timeout(read_timeout, response.text())
            .await
            .ok()
            .and_then(std::result::Result::ok)
            .unwrap_or_default();
        tracing::error!(
            %service,
            phase = "status",
            status = status.as_u16(),
            body = %truncate(&body, MAX_LOGGED_BODY),
            "upstream returned error status"
        );
        return Err(Error::Upstream {
            service,
            status: Some(status.as_u16()),
            message: format!("upstream returned {status}"),
        });
    }

    tracing::debug!(%service, status = status.as_u16(), "upstream stream opened");
    Ok(response)
}

/// Spawn the pump task for an opened upstream response
pub(crate) fn spawn_pump<D: ChunkDecoder>(
    service: Upstream,
    response: reqwest::Response,
    decoder: D,
    settings: &UpstreamSettings,
) -> RelayStream<D::Item> {
    let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
    let read_timeout = settings.read_timeout;

    tokio::spawn(pump(service, response, decoder, tx, read_timeout));

    RelayStream::new(rx)
}

async fn pump<D: ChunkDecoder>(
    service: Upstream,
    response: reqwest::Response,
    mut decoder: D,
    tx: mpsc::Sender<Result<D::Item>>,
    read_timeout: Duration,
) {
    let mut body = pin!(response.bytes_stream());
    let mut items = Vec::new();
    let mut chunks = 0_usize;

    loop {
        let next = tokio::select! {
            () = tx.closed() => {
                tracing::debug!(%service, chunks, "caller went away, releasing upstream");
                return;
            }
            next = tokio::time::timeout(read_timeout, body.next()) => next,
        };

        match next {
            Ok(Some(Ok(chunk))) => {
                chunks += 1;
                match decoder.decode(chunk, &mut items) {
                    Ok(Progress::Continue) => {}
                    Ok(Progress::Done) => {
                        // Returning drops the response without reading past the marker
                        if forward(&tx, &mut items).await {
                            tracing::debug!(%service, chunks, "upstream signalled end of stream");
                        }
                        return;
                    }
                    Err(message) => {
                        tracing::warn!(%service, phase = "decode", chunks, error = %message, "upstream stream rejected");
                        interrupt(&tx, &mut items, service, message).await;
                        return;
                    }
                }
            }
            Ok(None) => {
                decoder.finish(&mut items);
                if forward(&tx, &mut items).await {
                    tracing::debug!(%service, chunks, "upstream stream complete");
                }
                return;
            }
            Ok(Some(Err(e))) => {
                tracing::warn!(%service, phase = "stream", chunks, error = %e, "upstream stream dropped");
                interrupt(&tx, &mut items, service, e.to_string()).await;
                return;
            }
            Err(_) => {
                tracing::warn!(
                    %service,
                    phase = "stream",
                    chunks,
                    timeout_ms = read_timeout.as_millis(),
                    "upstream stream stalled"
                );
                interrupt(
                    &tx,
                    &mut items,
                    service,
                    format!("no data for {read_timeout:?}"),
                )
                .await;
                return;
            }
        }

        if !forward(&tx, &mut items).await {
            tracing::debug!(%service, chunks, "caller went away, releasing upstream");
            return;
        }
    }
}

/// Send decoded items in order; false once the caller is gone
async fn forward<T>(tx: &mpsc::Sender<Result<T>>, items: &mut Vec<T>) -> bool {
    for item in items.drain(..) {
        if tx.send(Ok(item)).await.is_err() {
            return false;
        }
    }
    true
}

/// Flush items decoded before the failure, then signal the interruption
async fn interrupt<T>(
    tx: &mpsc::Sender<Result<T>>,
    items: &mut Vec<T>,
    service: Upstream,
    message: String,
) {
    if forward(tx, items).await {
        let _ = tx
            .send(Err(Error::StreamInterrupted { service, message }))
            .await;
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
