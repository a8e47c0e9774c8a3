//! Streaming dispatch: fallback on open, capability filter, cancellation.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

use common::{Behavior, MockAdapter};
use switchboard::providers::{EventStream, ProviderAdapter, ProviderMetadata};
use switchboard::types::{
    GenerateEvent, GenerateRequest, GenerateResponse, ProviderCapabilities,
};
use switchboard::{ProviderOptions, Result, RouteRequest, Switchboard, SwitchboardError};

/// Streams numbered text chunks forever.
struct EndlessAdapter {
    produced: Arc<AtomicUsize>,
}

#[async_trait]
impl ProviderAdapter for EndlessAdapter {
    fn name(&self) -> &str {
        "endless"
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new("endless-model")
    }

    async fn generate(&self, _request: &GenerateRequest) -> Result<GenerateResponse> {
        Err(SwitchboardError::Unsupported("generate"))
    }

    async fn generate_stream(&self, _request: &GenerateRequest) -> Result<EventStream> {
        let produced = Arc::clone(&self.produced);
        Ok(Box::pin(stream::repeat_with(move || {
            let n = produced.fetch_add(1, Ordering::SeqCst);
            Ok(GenerateEvent::Text(n.to_string()))
        })))
    }
}

async fn collect_text(stream: switchboard::RoutedStream) -> String {
    let mut text = String::new();
    let mut stream = stream;
    while let Some(event) = stream.next().await {
        match event.unwrap() {
            GenerateEvent::Text(t) => text.push_str(&t),
            GenerateEvent::Done => break,
            _ => {}
        }
    }
    text
}

#[tokio::test]
async fn stream_falls_back_when_opening_fails() {
    let a = Arc::new(MockAdapter::new("alpha").behavior(Behavior::Transient));
    let b = Arc::new(MockAdapter::new("bravo"));
    let board = Switchboard::builder()
        .provider_arc(a.clone(), ProviderOptions::new().priority(1))
        .provider_arc(b.clone(), ProviderOptions::new().priority(2))
        .build()
        .unwrap();

    let stream = board
        .generate_stream(&RouteRequest::prompt("hi"))
        .await
        .unwrap();

    assert_eq!(stream.provenance.provider, "bravo");
    assert_eq!(stream.provenance.model, "bravo-model");
    assert_eq!(stream.provenance.fallback_path, vec!["alpha", "bravo"]);
    assert!(stream.provenance.usage.is_none());
    assert_eq!(collect_text(stream).await, "hello from bravo");
    assert_eq!(board.tracker().snapshot("alpha").consecutive_failures, 1);
}

#[tokio::test]
async fn non_streaming_provider_is_skipped_only_for_streams() {
    let batch_only = MockAdapter::new("batch")
        .capabilities(ProviderCapabilities::default().streaming(false));
    let board = Switchboard::builder()
        .provider(batch_only, ProviderOptions::new().priority(1))
        .provider(MockAdapter::new("live"), ProviderOptions::new().priority(2))
        .build()
        .unwrap();
    let request = RouteRequest::prompt("hi");

    let routed = board.generate(&request).await.unwrap();
    assert_eq!(routed.provider(), "batch");

    let stream = board.generate_stream(&request).await.unwrap();
    assert_eq!(stream.provenance.provider, "live");
}

#[tokio::test]
async fn stream_with_no_streaming_provider_is_rejected() {
    let board = Switchboard::builder()
        .provider(
            MockAdapter::new("batch")
                .capabilities(ProviderCapabilities::default().streaming(false)),
            ProviderOptions::new(),
        )
        .build()
        .unwrap();

    let err = board
        .generate_stream(&RouteRequest::prompt("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, SwitchboardError::NoSuitableProvider { .. }));
}

#[tokio::test]
async fn cancel_stops_a_running_stream() {
    let produced = Arc::new(AtomicUsize::new(0));
    let board = Switchboard::builder()
        .provider(
            EndlessAdapter {
                produced: Arc::clone(&produced),
            },
            ProviderOptions::new(),
        )
        .build()
        .unwrap();
    let cancel = CancellationToken::new();

    let mut stream = board
        .generate_stream_with_cancel(&RouteRequest::prompt("hi"), cancel.clone())
        .await
        .unwrap();

    for _ in 0..10 {
        assert!(stream.next().await.is_some());
    }
    cancel.cancel();

    // Whatever was already buffered drains, then the stream ends.
    let mut after_cancel = 0;
    while stream.next().await.is_some() {
        after_cancel += 1;
        assert!(after_cancel <= 100, "stream kept running after cancel");
    }
    assert!(after_cancel <= 66);
}

#[tokio::test]
async fn dropping_the_stream_stops_the_producer() {
    let produced = Arc::new(AtomicUsize::new(0));
    let board = Switchboard::builder()
        .provider(
            EndlessAdapter {
                produced: Arc::clone(&produced),
            },
            ProviderOptions::new(),
        )
        .stream_buffer(4)
        .build()
        .unwrap();

    let mut stream = board
        .generate_stream(&RouteRequest::prompt("hi"))
        .await
        .unwrap();
    stream.next().await;
    drop(stream);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let settled = produced.load(Ordering::SeqCst);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(produced.load(Ordering::SeqCst), settled);
}
