//! Lazily produced text fragments with an explicit end signal.

use std::sync::Arc;

use futures::{
    stream::{self, BoxStream},
    Stream, StreamExt,
};
use tokio::sync::watch;

use crate::host::HostError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Chunk(String),
    Completed,
    Failed(HostError),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Yields `Chunk` events, then exactly one of `Completed`, `Failed` or
/// `Cancelled`, then `None`.
pub struct ChunkStream {
    inner: BoxStream<'static, Result<String, HostError>>,
    cancel: CancelHandle,
    cancel_rx: watch::Receiver<bool>,
    finished: bool,
}

impl ChunkStream {
    pub fn new<S>(chunks: S) -> Self
    where
        S: Stream<Item = Result<String, HostError>> + Send + 'static,
    {
        let (cancel, cancel_rx) = CancelHandle::new();
        Self {
            inner: chunks.boxed(),
            cancel,
            cancel_rx,
            finished: false,
        }
    }

    pub fn from_chunks(chunks: Vec<String>) -> Self {
        Self::new(stream::iter(chunks.into_iter().map(Ok)))
    }

    pub fn failed(err: HostError) -> Self {
        Self::new(stream::once(async move { Err::<String, HostError>(err) }))
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        if *self.cancel_rx.borrow() {
            return Some(self.finish(StreamEvent::Cancelled));
        }

        // the handle held by `self` keeps the sender alive, so `changed`
        // only resolves on an actual cancel
        let next = tokio::select! {
            biased;
            _ = self.cancel_rx.changed() => None,
            item = self.inner.next() => Some(item),
        };

        let event = match next {
            None => StreamEvent::Cancelled,
            Some(Some(Ok(chunk))) => return Some(StreamEvent::Chunk(chunk)),
            Some(Some(Err(HostError::Cancelled))) => StreamEvent::Cancelled,
            Some(Some(Err(err))) => StreamEvent::Failed(err),
            Some(None) => StreamEvent::Completed,
        };
        Some(self.finish(event))
    }

    /// Concatenates normalised fragments until the stream ends.
    pub async fn collect_text(mut self) -> Result<String, HostError> {
        let mut normalizer = DeltaNormalizer::default();
        let mut text = String::new();
        while let Some(event) = self.next_event().await {
            match event {
                StreamEvent::Chunk(chunk) => text.push_str(&normalizer.push(&chunk)),
                StreamEvent::Completed => break,
                StreamEvent::Failed(err) => return Err(err),
                StreamEvent::Cancelled => return Err(HostError::Cancelled),
            }
        }
        Ok(text)
    }

    fn finish(&mut self, event: StreamEvent) -> StreamEvent {
        self.finished = true;
        // drop the producer so it observes the closed consumer
        self.inner = stream::empty().boxed();
        event
    }
}

/// Turns cumulative chunks ("Hel", "Hello") into increments ("Hel", "lo").
/// A chunk that does not extend the previous one passes through unchanged.
#[derive(Debug, Default)]
pub struct DeltaNormalizer {
    previous: String,
}

impl DeltaNormalizer {
    pub fn push(&mut self, chunk: &str) -> String {
        let fragment = match chunk.strip_prefix(self.previous.as_str()) {
            Some(rest) => rest.to_string(),
            None => chunk.to_string(),
        };
        self.previous.clear();
        self.previous.push_str(chunk);
        fragment
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn normalizer_strips_cumulative_prefix() {
        let mut normalizer = DeltaNormalizer::default();
        assert_eq!(normalizer.push("Hel"), "Hel");
        assert_eq!(normalizer.push("Hello"), "lo");
        assert_eq!(normalizer.push("Hello world"), " world");
    }

    #[test]
    fn normalizer_passes_incremental_chunks_through() {
        let mut normalizer = DeltaNormalizer::default();
        assert_eq!(normalizer.push("Hel"), "Hel");
        assert_eq!(normalizer.push("lo"), "lo");
        assert_eq!(normalizer.push(" there"), " there");
    }

    #[tokio::test]
    async fn events_end_with_completed() {
        let mut stream = ChunkStream::from_chunks(vec!["a".into(), "ab".into()]);
        assert_eq!(stream.next_event().await, Some(StreamEvent::Chunk("a".into())));
        assert_eq!(stream.next_event().await, Some(StreamEvent::Chunk("ab".into())));
        assert_eq!(stream.next_event().await, Some(StreamEvent::Completed));
        assert_eq!(stream.next_event().await, None);
    }

    #[tokio::test]
    async fn failure_is_reported_once() {
        let mut stream = ChunkStream::failed(HostError::Inference("boom".into()));
        assert_eq!(
            stream.next_event().await,
            Some(StreamEvent::Failed(HostError::Inference("boom".into())))
        );
        assert_eq!(stream.next_event().await, None);
    }

    #[tokio::test]
    async fn collect_text_joins_cumulative_chunks() {
        let stream = ChunkStream::from_chunks(vec![
            "You ".into(),
            "You said: ".into(),
            "You said: hi".into(),
        ]);
        assert_eq!(stream.collect_text().await, Ok("You said: hi".to_string()));
    }

    #[tokio::test]
    async fn cancel_before_poll_ends_stream() {
        let mut stream = ChunkStream::from_chunks(vec!["never".into()]);
        stream.cancel_handle().cancel();
        assert_eq!(stream.next_event().await, Some(StreamEvent::Cancelled));
        assert_eq!(stream.next_event().await, None);
    }

    #[tokio::test]
    async fn cancel_interrupts_a_pending_chunk() {
        let mut stream = ChunkStream::new(stream::pending::<Result<String, HostError>>());
        let handle = stream.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel();
        });
        assert_eq!(stream.next_event().await, Some(StreamEvent::Cancelled));
        assert!(stream.cancel_handle().is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_collect_is_an_error() {
        let stream = ChunkStream::new(stream::pending::<Result<String, HostError>>());
        stream.cancel_handle().cancel();
        assert_eq!(stream.collect_text().await, Err(HostError::Cancelled));
    }
}
