//! Response cache in front of routing.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Behavior, MockAdapter};
use switchboard::types::GenerateOptions;
use switchboard::{CacheConfig, ProviderOptions, RouteRequest, Switchboard, TaskCategory};

fn cached_board(adapter: Arc<MockAdapter>) -> Switchboard {
    Switchboard::builder()
        .provider_arc(adapter, ProviderOptions::new())
        .response_cache(CacheConfig::new().ttl(Duration::from_secs(60)))
        .build()
        .unwrap()
}

#[tokio::test]
async fn identical_request_is_served_from_cache() {
    let adapter = Arc::new(MockAdapter::new("alpha"));
    let board = cached_board(adapter.clone());
    let request = RouteRequest::prompt("what is rust?");

    let first = board.generate(&request).await.unwrap();
    let second = board.generate(&request).await.unwrap();

    assert!(!first.provenance.cached);
    assert!(second.provenance.cached);
    assert_eq!(second.content(), first.content());
    assert_eq!(second.provenance.provider, "alpha");
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn cache_hit_is_not_recorded_as_a_request() {
    let adapter = Arc::new(MockAdapter::new("alpha"));
    let board = cached_board(adapter);
    let request = RouteRequest::prompt("hello");

    board.generate(&request).await.unwrap();
    board.generate(&request).await.unwrap();

    assert_eq!(board.tracker().snapshot("alpha").total_requests, 1);
}

#[tokio::test]
async fn bypass_skips_the_cache() {
    let adapter = Arc::new(MockAdapter::new("alpha"));
    let board = cached_board(adapter.clone());

    board.generate(&RouteRequest::prompt("hi")).await.unwrap();
    let routed = board
        .generate(&RouteRequest::prompt("hi").bypass_cache())
        .await
        .unwrap();

    assert!(!routed.provenance.cached);
    assert_eq!(adapter.calls(), 2);
}

#[tokio::test]
async fn anything_that_changes_the_answer_changes_the_key() {
    let adapter = Arc::new(MockAdapter::new("alpha"));
    let board = cached_board(adapter.clone());

    board.generate(&RouteRequest::prompt("hi")).await.unwrap();
    board.generate(&RouteRequest::prompt("hello")).await.unwrap();
    board
        .generate(&RouteRequest::prompt("hi").task(TaskCategory::Conversation))
        .await
        .unwrap();
    board
        .generate(&RouteRequest::prompt("hi").options(GenerateOptions::new().temperature(0.2)))
        .await
        .unwrap();

    assert_eq!(adapter.calls(), 4);
}

#[tokio::test]
async fn failures_are_not_cached() {
    let adapter = Arc::new(MockAdapter::new("alpha").behavior(Behavior::Permanent));
    let board = cached_board(adapter.clone());
    let request = RouteRequest::prompt("hi");

    assert!(board.generate(&request).await.is_err());
    adapter.set_behavior(Behavior::Succeed);
    let routed = board.generate(&request).await.unwrap();

    assert!(!routed.provenance.cached);
    assert_eq!(adapter.calls(), 2);
}

#[tokio::test]
async fn cache_is_off_unless_configured() {
    let adapter = Arc::new(MockAdapter::new("alpha"));
    let board = Switchboard::builder()
        .provider_arc(adapter.clone(), ProviderOptions::new())
        .build()
        .unwrap();
    let request = RouteRequest::prompt("hi");

    board.generate(&request).await.unwrap();
    board.generate(&request).await.unwrap();

    assert!(board.cache().is_none());
    assert_eq!(adapter.calls(), 2);
}
