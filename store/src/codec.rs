//! Row codec shared by the SQL backends.

use md5::{Digest, Md5};
use mnema_core::{Embedding, Memory, MemoryError, Result};
use serde_json::{Map, Value};
use time::OffsetDateTime;

/// Encodes an embedding as little-endian f32 bytes.
pub(crate) fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decodes little-endian f32 bytes back into an embedding.
pub(crate) fn decode_embedding(op: &str, bytes: &[u8]) -> Result<Embedding> {
    if bytes.len() % 4 != 0 {
        return Err(MemoryError::storage(
            op,
            format!("embedding blob of {} bytes is not f32-aligned", bytes.len()),
        ));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Cosine similarity on `[-1,1]`; zero vectors score 0.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut mag_a = 0.0f64;
    let mut mag_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += f64::from(x) * f64::from(y);
        mag_a += f64::from(x) * f64::from(x);
        mag_b += f64::from(y) * f64::from(y);
    }
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a.sqrt() * mag_b.sqrt())
}

/// Hex md5 of the content, the optional dedup column of the row layout.
pub(crate) fn content_hash(content: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for byte in digest {
        use core::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Parses the metadata JSON column, tolerating NULL.
pub(crate) fn decode_metadata(op: &str, raw: Option<&str>) -> Result<Map<String, Value>> {
    match raw {
        None => Ok(Map::new()),
        Some(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(MemoryError::storage(op, "metadata column is not an object")),
            Err(err) => {
                Err(MemoryError::storage(op, "metadata column is not valid JSON").with_source(err))
            }
        },
    }
}

/// Converts a stored unix-nanosecond value back to a timestamp.
pub(crate) fn decode_timestamp(op: &str, nanos: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
        .map_err(|err| MemoryError::storage(op, "timestamp out of range").with_source(err))
}

/// Converts a timestamp to the stored unix-nanosecond value.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn encode_timestamp(timestamp: OffsetDateTime) -> i64 {
    timestamp.unix_timestamp_nanos() as i64
}

/// Validates embedding length against the collection dimension.
pub(crate) fn check_dimension(op: &str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(MemoryError::invalid_input(
            op,
            format!("embedding dimension {actual} does not match collection dimension {expected}"),
        ))
    }
}

/// Scores, filters, orders, and truncates scanned rows.
///
/// Order is score descending with ties broken by id descending; every
/// surviving row carries `score >= min_score`.
pub(crate) fn rank_scanned(
    mut scored: Vec<Memory>,
    min_score: f64,
    limit: usize,
) -> Vec<Memory> {
    scored.retain(|memory| memory.score.unwrap_or(f64::MIN) >= min_score);
    scored.sort_by(|a, b| {
        let score_a = a.score.unwrap_or(f64::MIN);
        let score_b = b.score.unwrap_or(f64::MIN);
        score_b
            .total_cmp(&score_a)
            .then_with(|| b.id.cmp(&a.id))
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_blob_round_trips() {
        let embedding = vec![0.25f32, -1.5, 3.0];
        let bytes = encode_embedding(&embedding);
        assert_eq!(decode_embedding("test", &bytes).unwrap(), embedding);
    }

    #[test]
    fn misaligned_blob_is_rejected() {
        let err = decode_embedding("test", &[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), mnema_core::ErrorKind::StorageOperation);
    }

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.3f32, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).abs() < 1e-9);
    }

    #[test]
    fn md5_hash_matches_known_value() {
        // md5("hello") is well known.
        assert_eq!(content_hash("hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn rank_orders_by_score_then_id_desc() {
        let mut a = Memory::new(1, "u", "a");
        a.score = Some(0.5);
        let mut b = Memory::new(2, "u", "b");
        b.score = Some(0.9);
        let mut c = Memory::new(3, "u", "c");
        c.score = Some(0.5);

        let ranked = rank_scanned(vec![a, b, c], 0.0, 10);
        let ids: Vec<i64> = ranked.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn rank_applies_min_score_and_limit() {
        let mut a = Memory::new(1, "u", "a");
        a.score = Some(0.2);
        let mut b = Memory::new(2, "u", "b");
        b.score = Some(0.8);
        let ranked = rank_scanned(vec![a, b], 0.5, 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, 2);
    }
}
