//! Incremental server-sent events framing.
//!
//! Bytes are buffered until a full line is available, so UTF-8 sequences and
//! lines split across chunks are reassembled before parsing. A frame ends at a
//! blank line; `data:` lines inside one frame are joined with `\n`.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;

/// One dispatched SSE frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// Value of the `event:` field, if the frame had one.
    pub event: Option<String>,
    /// Joined `data:` payload.
    pub data: String,
    /// Value of the `id:` field, if the frame had one.
    pub id: Option<String>,
}

#[derive(Debug, Default)]
struct FrameBuilder {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl FrameBuilder {
    /// Feeds one line; returns a frame when the line closes one.
    fn push_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.take();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn take(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() && self.event.is_none() && self.id.is_none() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: self.event.take(),
            data,
            id: self.id.take(),
        })
    }
}

/// Adapts a byte-chunk stream into a stream of [`SseFrame`]s.
#[derive(Debug)]
pub struct SseFrameStream<S> {
    inner: S,
    buffer: Vec<u8>,
    builder: FrameBuilder,
    done: bool,
}

impl<S> SseFrameStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            builder: FrameBuilder::default(),
            done: false,
        }
    }

    fn next_buffered_frame(&mut self) -> Option<SseFrame> {
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(frame) = self.builder.push_line(&String::from_utf8_lossy(&line)) {
                return Some(frame);
            }
        }
        None
    }

    fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            if let Some(frame) = self.builder.push_line(&String::from_utf8_lossy(&line)) {
                return Some(frame);
            }
        }
        self.builder.take()
    }
}

impl<S, B, E> Stream for SseFrameStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<SseFrame, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(frame) = this.next_buffered_frame() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.buffer.extend_from_slice(chunk.as_ref()),
                Poll::Ready(Some(Err(error))) => return Poll::Ready(Some(Err(error))),
                Poll::Ready(None) => {
                    this.done = true;
                    return Poll::Ready(this.finish().map(Ok));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
