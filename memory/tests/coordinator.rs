//! Coordinator round-trips, tenancy, ordering, and lifecycle behaviour
//! against the embedded store.

mod common;

use common::plain_client;
use mnema_core::ErrorKind;
use mnema_memory::{AccessOptions, AddOptions, ListOptions, SearchOptions};

fn simple(user: &str) -> AddOptions {
    AddOptions::new(user).without_infer()
}

#[tokio::test]
async fn add_then_get_round_trips() {
    let (client, _, _) = plain_client().await;

    let added = client
        .add("User likes oolong tea", &simple("u1"))
        .await
        .unwrap()
        .unwrap();
    let fetched = client
        .get(added.id, &AccessOptions::new("u1"))
        .await
        .unwrap();
    assert_eq!(fetched.content, "User likes oolong tea");
    assert_eq!(fetched.user_id, "u1");
}

#[tokio::test]
async fn update_round_trips_and_bumps_updated_at() {
    let (client, _, _) = plain_client().await;

    let added = client
        .add("User is 28 years old", &simple("u1"))
        .await
        .unwrap()
        .unwrap();
    client
        .update(added.id, "User is 29 years old", &AccessOptions::new("u1"))
        .await
        .unwrap();

    let fetched = client
        .get(added.id, &AccessOptions::new("u1"))
        .await
        .unwrap();
    assert_eq!(fetched.content, "User is 29 years old");
    assert!(fetched.updated_at > fetched.created_at);
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let (client, _, _) = plain_client().await;

    let added = client
        .add("ephemeral", &simple("u1"))
        .await
        .unwrap()
        .unwrap();
    client
        .delete(added.id, &AccessOptions::new("u1"))
        .await
        .unwrap();

    let err = client
        .get(added.id, &AccessOptions::new("u1"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn tenancy_masks_foreign_rows() {
    let (client, _, _) = plain_client().await;

    let added = client
        .add("u1's secret", &simple("u1"))
        .await
        .unwrap()
        .unwrap();
    assert!(client
        .get(added.id, &AccessOptions::new("u2"))
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn consecutive_ids_are_strictly_increasing() {
    let (client, _, _) = plain_client().await;

    let mut previous = 0;
    for i in 0..5 {
        let added = client
            .add(&format!("memory number {i}"), &simple("u1"))
            .await
            .unwrap()
            .unwrap();
        assert!(added.id > previous);
        previous = added.id;
    }
}

#[tokio::test]
async fn empty_content_is_invalid_input() {
    let (client, _, _) = plain_client().await;
    let err = client.add("   ", &simple("u1")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = client.add("fine", &simple("")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn search_scores_are_descending_and_floored() {
    let (client, embedder, _) = plain_client().await;
    embedder.register("query", &[1.0, 0.0, 0.0, 0.0]);
    embedder.register("exact", &[1.0, 0.0, 0.0, 0.0]);
    embedder.register("near", &[0.9, 0.4359, 0.0, 0.0]);
    embedder.register("far", &[0.0, 1.0, 0.0, 0.0]);

    for content in ["exact", "near", "far"] {
        client.add(content, &simple("u1")).await.unwrap();
    }

    let results = client
        .search(
            "query",
            &SearchOptions::new("u1").with_min_score(0.5).with_limit(10),
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    for window in results.windows(2) {
        assert!(window[0].score.unwrap() >= window[1].score.unwrap());
    }
    for memory in &results {
        assert!(memory.score.unwrap() >= 0.5);
    }
}

#[tokio::test]
async fn get_reinforces_retention_and_counts_accesses() {
    let (client, _, _) = plain_client().await;

    let added = client
        .add("reinforced memory", &simple("u1"))
        .await
        .unwrap()
        .unwrap();

    let first = client
        .get(added.id, &AccessOptions::new("u1"))
        .await
        .unwrap();
    assert_eq!(first.access_count(), 1);
    assert!(first.last_accessed_at.is_some());
    assert!(first.retention_strength <= 1.0);

    let second = client
        .get(added.id, &AccessOptions::new("u1"))
        .await
        .unwrap();
    assert_eq!(second.access_count(), 2);
    assert!(second.retention_strength >= first.retention_strength - 1e-9);
}

#[tokio::test]
async fn get_all_pages_newest_first() {
    let (client, _, _) = plain_client().await;

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(
            client
                .add(&format!("item {i}"), &simple("u1"))
                .await
                .unwrap()
                .unwrap()
                .id,
        );
    }

    let page = client
        .get_all(&ListOptions::new("u1").with_limit(3))
        .await
        .unwrap();
    let got: Vec<i64> = page.iter().map(|m| m.id).collect();
    // Ids are time-ordered, so newest-first equals descending ids here.
    let mut expected = ids.clone();
    expected.reverse();
    assert_eq!(got, expected[..3].to_vec());
}

#[tokio::test]
async fn delete_all_is_idempotent() {
    let (client, _, _) = plain_client().await;

    for i in 0..3 {
        client
            .add(&format!("row {i}"), &simple("u1"))
            .await
            .unwrap();
    }

    assert_eq!(client.delete_all(&AccessOptions::new("u1")).await.unwrap(), 3);
    assert_eq!(client.delete_all(&AccessOptions::new("u1")).await.unwrap(), 0);
}

#[tokio::test]
async fn close_succeeds_once_everything_shut_down() {
    let (client, _, _) = plain_client().await;
    client.close().await.unwrap();
}
