//! Stream session lifecycle.
//!
//! A [`StreamSession`] owns exactly one stream connection. Reads are raced
//! against a [`CancellationToken`], so [`StopHandle::stop`] ends a session
//! promptly even while it is parked waiting on an idle connection.
//!
//! The session moves forward through [`StreamState`] and never goes back; a
//! closed session yields `None` forever and cannot be reopened. Call
//! [`StreamClient::open`] again to resume.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::stream::client::{StreamClient, StreamError};
use crate::stream::proto::StreamEvent;
use crate::stream::sse::SseFrameStream;

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;
type FrameStream = SseFrameStream<ByteStream>;

/// Lifecycle of a stream session, in the only order it can be traversed.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamState {
    Disconnected = 0,
    /// Opened; the request has not produced a response head yet.
    Connecting = 1,
    /// Response head received. The only state that yields events.
    Connected = 2,
    /// Stop requested; the connection is about to be released.
    Stopping = 3,
    Closed = 4,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disconnected,
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Stopping,
            _ => Self::Closed,
        }
    }
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: StreamState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn load(&self) -> StreamState {
        StreamState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` if that is strictly later than the current state.
    fn advance(&self, next: StreamState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < next as u8).then_some(next as u8)
            })
            .is_ok()
    }
}

/// Cloneable handle that stops a [`StreamSession`] from any task.
#[derive(Clone, Debug)]
pub struct StopHandle {
    cancel: CancellationToken,
    state: Arc<StateCell>,
}

impl StopHandle {
    /// Requests the session to stop.
    ///
    /// Idempotent, and a no-op once the session has closed. The consumer sees
    /// its next (or pending) read end with `None`, not an error.
    pub fn stop(&self) {
        if self.state.advance(StreamState::Stopping) {
            info!(event = "stream_stop_requested");
        }
        self.cancel.cancel();
    }

    pub fn state(&self) -> StreamState {
        self.state.load()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// One notification stream connection, read lazily.
pub struct StreamSession {
    client: StreamClient,
    frames: Option<FrameStream>,
    state: Arc<StateCell>,
    cancel: CancellationToken,
    yielded_any: bool,
}

impl StreamSession {
    pub(crate) fn new(client: StreamClient) -> Self {
        let state = Arc::new(StateCell::new(StreamState::Disconnected));
        state.advance(StreamState::Connecting);
        Self {
            client,
            frames: None,
            state,
            cancel: CancellationToken::new(),
            yielded_any: false,
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            cancel: self.cancel.clone(),
            state: Arc::clone(&self.state),
        }
    }

    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    pub fn state(&self) -> StreamState {
        self.state.load()
    }

    /// Receives the next event.
    ///
    /// The first call sends the stream request. Malformed frames are logged
    /// and skipped. Returns:
    /// - `Some(Ok(event))` for each event, in server order;
    /// - `Some(Err(_))` once if the open is rejected, the transport fails,
    ///   or the server closes the stream ([`StreamError::Disconnected`]);
    /// - `None` after a stop, and on every call after the session closed.
    pub async fn recv(&mut self) -> Option<Result<StreamEvent, StreamError>> {
        loop {
            if self.state.load() >= StreamState::Stopping || self.cancel.is_cancelled() {
                self.release();
                return None;
            }

            if self.frames.is_none() {
                let opened = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    result = self.client.connect() => Some(result),
                };
                match opened {
                    None => continue,
                    Some(Ok(response)) => {
                        if !self.state.advance(StreamState::Connected) {
                            continue;
                        }
                        info!(event = "stream_connected", status = %response.status());
                        let body: ByteStream = Box::pin(response.bytes_stream());
                        self.frames = Some(SseFrameStream::new(body));
                    }
                    Some(Err(err)) => {
                        self.release();
                        return Some(Err(err));
                    }
                }
                continue;
            }
            let Some(frames) = self.frames.as_mut() else {
                continue;
            };

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => continue,
                next = frames.next() => next,
            };

            match next {
                Some(Ok(frame)) => match StreamEvent::from_frame(&frame) {
                    Ok(Some(event)) if event.is_connect() && self.yielded_any => {
                        warn!(event = "stream_connect_out_of_order");
                    }
                    Ok(Some(event)) => {
                        self.yielded_any = true;
                        return Some(Ok(event));
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(
                            event = "stream_frame_skipped",
                            sse_event = frame.event.as_deref().unwrap_or_default(),
                            error = %err
                        );
                    }
                },
                Some(Err(err)) => {
                    warn!(event = "stream_transport_failed", error = %err);
                    self.release();
                    return Some(Err(StreamError::Transport(err)));
                }
                None => {
                    info!(event = "stream_disconnected");
                    self.release();
                    return Some(Err(StreamError::Disconnected));
                }
            }
        }
    }

    /// Consumes the session as a [`Stream`] of events.
    pub fn into_stream(self) -> impl Stream<Item = Result<StreamEvent, StreamError>> + Send {
        futures_util::stream::unfold(self, |mut session| async move {
            let item = session.recv().await?;
            Some((item, session))
        })
    }

    fn release(&mut self) {
        if let Some(frames) = self.frames.take() {
            drop(frames);
            debug!(event = "stream_connection_released");
        }
        self.state.advance(StreamState::Closed);
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.release();
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("endpoint", &self.client.endpoint())
            .field("state", &self.state.load())
            .field("connected", &self.frames.is_some())
            .finish()
    }
}
