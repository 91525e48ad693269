//! Streaming pagination and cancellation semantics.

mod common;

use common::plain_client;
use mnema_memory::{AddOptions, CancellationToken, ListOptions, SearchOptions};

fn simple(user: &str) -> AddOptions {
    AddOptions::new(user).without_infer()
}

#[tokio::test]
async fn get_all_stream_paginates_with_one_last_batch() {
    let (client, _, _) = plain_client().await;
    for i in 0..8 {
        client
            .add(&format!("memory {i}"), &simple("u1"))
            .await
            .unwrap();
    }

    let mut rx = client
        .get_all_stream(3, &ListOptions::new("u1").with_limit(10))
        .await;

    let mut sizes = Vec::new();
    let mut indexes = Vec::new();
    let mut last_flags = Vec::new();
    while let Some(batch) = rx.recv().await {
        assert!(batch.error.is_none(), "unexpected error batch");
        sizes.push(batch.memories.len());
        indexes.push(batch.batch_index);
        last_flags.push(batch.is_last_batch);
    }

    assert_eq!(sizes, vec![3, 3, 2]);
    assert_eq!(indexes, vec![0, 1, 2]);
    assert_eq!(last_flags, vec![false, false, true]);
}

#[tokio::test]
async fn get_all_stream_on_empty_tenant_emits_one_empty_last_batch() {
    let (client, _, _) = plain_client().await;

    let mut rx = client
        .get_all_stream(4, &ListOptions::new("nobody"))
        .await;
    let batch = rx.recv().await.unwrap();
    assert!(batch.memories.is_empty());
    assert!(batch.is_last_batch);
    assert!(batch.error.is_none());
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn search_stream_paginates_search_results() {
    let (client, _, _) = plain_client().await;
    for i in 0..7 {
        client
            .add(&format!("searchable {i}"), &simple("u1"))
            .await
            .unwrap();
    }

    let mut rx = client
        .search_stream("searchable", 2, &SearchOptions::new("u1").with_limit(7))
        .await;

    let mut total = 0;
    let mut batches = 0;
    let mut saw_last = 0;
    while let Some(batch) = rx.recv().await {
        assert!(batch.error.is_none());
        assert_eq!(batch.batch_index, batches);
        batches += 1;
        total += batch.memories.len();
        if batch.is_last_batch {
            saw_last += 1;
        }
    }

    assert_eq!(total, 7);
    assert_eq!(batches, 4);
    assert_eq!(saw_last, 1);
}

#[tokio::test]
async fn cancelled_search_stream_emits_a_cancellation_batch() {
    let (client, _, _) = plain_client().await;
    for i in 0..20 {
        client
            .add(&format!("streamed {i}"), &simple("u1"))
            .await
            .unwrap();
    }

    let token = CancellationToken::new();
    let mut rx = client
        .search_stream(
            "streamed",
            2,
            &SearchOptions::new("u1")
                .with_limit(20)
                .with_cancellation(token.clone()),
        )
        .await;

    let first = rx.recv().await.unwrap();
    assert!(first.error.is_none());
    token.cancel();

    let mut cancelled = false;
    while let Some(batch) = rx.recv().await {
        if let Some(error) = &batch.error {
            assert!(error.is_cancelled());
            cancelled = true;
        }
    }
    assert!(cancelled, "expected a terminal cancellation batch");
}

#[tokio::test]
async fn pre_cancelled_stream_fails_immediately() {
    let (client, _, _) = plain_client().await;

    let token = CancellationToken::new();
    token.cancel();
    let mut rx = client
        .get_all_stream(
            3,
            &ListOptions::new("u1").with_cancellation(token),
        )
        .await;

    let batch = rx.recv().await.unwrap();
    assert!(batch.error.as_ref().unwrap().is_cancelled());
    assert!(rx.recv().await.is_none());
}
