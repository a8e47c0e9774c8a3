//! Streaming backpressure via bounded channels.
//!
//! Wraps an adapter stream in a bounded `tokio::sync::mpsc::channel` so the
//! producer waits when the consumer falls behind. The producer task stops
//! as soon as the consumer drops the stream or the request is cancelled,
//! which also drops (and so aborts) the underlying HTTP body.

use futures_util::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::traits::EventStream;

/// Default number of events buffered between producer and consumer.
pub const DEFAULT_STREAM_BUFFER: usize = 64;

/// Wrap a stream in a bounded channel for backpressure.
///
/// Requires a tokio runtime context.
pub fn bounded_stream(
    inner: EventStream,
    buffer_size: usize,
    cancel: Option<CancellationToken>,
) -> EventStream {
    let (tx, rx) = tokio::sync::mpsc::channel(buffer_size.max(1));
    let cancel = cancel.unwrap_or_default();

    tokio::spawn(async move {
        let mut inner = inner;
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tx.closed() => break,
                item = inner.next() => item,
            };
            let Some(item) = item else { break };
            if tx.send(item).await.is_err() {
                break; // receiver dropped
            }
        }
    });

    Box::pin(ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenerateEvent;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_stream(produced: Arc<AtomicUsize>) -> EventStream {
        Box::pin(futures_util::stream::iter(0..1000).map(move |i| {
            produced.fetch_add(1, Ordering::SeqCst);
            Ok(GenerateEvent::Text(i.to_string()))
        }))
    }

    #[tokio::test]
    async fn forwards_all_items_in_order() {
        let inner: EventStream = Box::pin(futures_util::stream::iter(vec![
            Ok(GenerateEvent::Text("a".into())),
            Ok(GenerateEvent::Text("b".into())),
            Ok(GenerateEvent::Done),
        ]));
        let events: Vec<_> = bounded_stream(inner, 2, None)
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                GenerateEvent::Text("a".into()),
                GenerateEvent::Text("b".into()),
                GenerateEvent::Done
            ]
        );
    }

    #[tokio::test]
    async fn producer_is_bounded_by_buffer() {
        let produced = Arc::new(AtomicUsize::new(0));
        let mut stream = bounded_stream(counting_stream(produced.clone()), 4, None);

        let _ = stream.next().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // one consumed, four buffered, at most one pending send
        assert!(produced.load(Ordering::SeqCst) <= 6);
    }

    #[tokio::test]
    async fn cancellation_ends_stream() {
        let produced = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        let mut stream = bounded_stream(counting_stream(produced), 1, Some(token.clone()));

        assert!(stream.next().await.is_some());
        token.cancel();

        // drain whatever was already buffered; the stream must then end
        let mut remaining = 0;
        while stream.next().await.is_some() {
            remaining += 1;
        }
        assert!(remaining <= 2);
    }
}
