use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt as _, TryStreamExt as _};
use tracing::debug;

use crate::errors::StreamError;
use crate::frame::{FrameConfig, StreamEvent, StreamFrameReader};

type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send + 'static>>;

/// Text fragments of one streamed reply, in arrival order.
///
/// Ends on the terminal sentinel, on transport closure (after a best-effort
/// flush of the leftover), or on the first transport error.
pub struct ReplyStream {
    fragments: BoxStream<'static, Result<String, StreamError>>,
    text: String,
}

impl ReplyStream {
    /// Wraps a chunk stream such as an HTTP response body.
    pub fn new<S, E>(chunks: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display,
    {
        Self::with_config(chunks, FrameConfig::default())
    }

    pub fn with_config<S, E>(chunks: S, config: FrameConfig) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display,
    {
        let chunks: ChunkStream =
            Box::pin(chunks.map_err(|e| StreamError::Transport(e.to_string())));
        Self {
            fragments: fragment_stream(chunks, StreamFrameReader::new(config)).boxed(),
            text: String::new(),
        }
    }

    /// Next fragment; `None` once the reply is complete.
    pub async fn next_fragment(&mut self) -> Option<Result<String, StreamError>> {
        let item = self.fragments.next().await;
        if let Some(Ok(fragment)) = &item {
            self.text.push_str(fragment);
        }
        item
    }

    /// Text received so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Drains the stream and returns the complete text.
    pub async fn collect_text(mut self) -> Result<String, StreamError> {
        while let Some(fragment) = self.next_fragment().await {
            fragment?;
        }
        Ok(self.text)
    }
}

fn fragment_stream(
    chunks: ChunkStream,
    reader: StreamFrameReader,
) -> impl Stream<Item = Result<String, StreamError>> + Send {
    struct State {
        chunks: ChunkStream,
        reader: StreamFrameReader,
        pending: VecDeque<String>,
        done: bool,
    }

    fn queue(pending: &mut VecDeque<String>, event: StreamEvent) {
        if let Some(fragment) = event.fragment().filter(|f| !f.is_empty()) {
            pending.push_back(fragment.to_string());
        }
    }

    stream::try_unfold(
        State {
            chunks,
            reader,
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(fragment) = state.pending.pop_front() {
                    return Ok(Some((fragment, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.chunks.next().await {
                    Some(Ok(chunk)) => {
                        state.reader.push_chunk(&chunk);
                        while let Some(event) = state.reader.next_event() {
                            queue(&mut state.pending, event);
                        }
                        if state.reader.is_finished() {
                            debug!("reply stream reached terminal sentinel");
                            state.done = true;
                        }
                    }
                    Some(Err(err)) => return Err(err),
                    None => {
                        for event in state.reader.finish() {
                            queue(&mut state.pending, event);
                        }
                        debug!(
                            dropped = state.reader.dropped_frames(),
                            "reply stream closed by transport"
                        );
                        state.done = true;
                    }
                }
            }
        },
    )
}
