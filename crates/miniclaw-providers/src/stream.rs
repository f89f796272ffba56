//! Server-sent-event plumbing shared by the streaming adapters.
//!
//! The HTTP body is parsed into SSE events with `eventsource-stream`; each
//! backend supplies an [`SseDecoder`] that turns events into [`Chunk`]s.
//! The resulting stream owns the response, so dropping it releases the
//! connection.

use std::collections::VecDeque;
use std::pin::Pin;

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{stream, Stream, StreamExt};
use miniclaw_core::error::ProviderError;
use miniclaw_core::types::Chunk;
use tracing::{error, trace};

use crate::traits::ChunkStream;

/// Backend-specific translation of SSE events into chunks.
pub(crate) trait SseDecoder: Send + 'static {
    /// Handle one event, queueing any chunks it produces.
    ///
    /// Returns `true` once the terminal `Done` chunk has been queued.
    fn on_event(&mut self, event: &Event, out: &mut VecDeque<Chunk>) -> Result<bool, ProviderError>;
}

type EventSource =
    Pin<Box<dyn Stream<Item = Result<Event, EventStreamError<reqwest::Error>>> + Send>>;

struct StreamState<D> {
    events: EventSource,
    decoder: D,
    pending: VecDeque<Chunk>,
    finished: bool,
    provider: &'static str,
}

/// Wrap a successful streaming response in a [`ChunkStream`].
pub(crate) fn sse_chunk_stream<D: SseDecoder>(
    response: reqwest::Response,
    decoder: D,
    provider: &'static str,
) -> ChunkStream {
    let state = StreamState {
        events: Box::pin(response.bytes_stream().eventsource()),
        decoder,
        pending: VecDeque::new(),
        finished: false,
        provider,
    };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(chunk) = st.pending.pop_front() {
                return Some((Ok(chunk), st));
            }
            if st.finished {
                return None;
            }

            match st.events.next().await {
                Some(Ok(event)) => {
                    trace!(provider = st.provider, event = %event.event, "SSE event");
                    match st.decoder.on_event(&event, &mut st.pending) {
                        Ok(done) => st.finished = done,
                        Err(e) => {
                            error!(provider = st.provider, error = %e, "Stream decode failed");
                            st.finished = true;
                            st.pending.clear();
                            return Some((Err(e), st));
                        }
                    }
                }
                Some(Err(e)) => {
                    error!(provider = st.provider, error = %e, "SSE transport error");
                    st.finished = true;
                    let err = ProviderError::Stream {
                        provider: st.provider.to_string(),
                        message: e.to_string(),
                    };
                    return Some((Err(err), st));
                }
                None => {
                    st.finished = true;
                    let err = ProviderError::Stream {
                        provider: st.provider.to_string(),
                        message: "stream closed before response completed".into(),
                    };
                    return Some((Err(err), st));
                }
            }
        }
    }))
}

/// Parse an SSE data payload, mapping failures to [`ProviderError::Stream`].
pub(crate) fn parse_event<T: serde::de::DeserializeOwned>(
    provider: &str,
    data: &str,
) -> Result<T, ProviderError> {
    serde_json::from_str(data).map_err(|e| ProviderError::Stream {
        provider: provider.to_string(),
        message: format!("invalid event payload: {e}"),
    })
}
