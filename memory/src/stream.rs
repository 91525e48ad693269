//! Batched channel delivery for streaming reads.
//!
//! Streams deliver [`MemoryBatch`] values over a capacity-1 channel:
//! batch indexes count up from zero, exactly one successful batch carries
//! `is_last_batch`, and failure or cancellation emits a single batch with
//! `error` set before the channel closes.

use std::sync::Arc;

use mnema_core::store::ListRequest;
use mnema_core::{Memory, MemoryError, Result, VectorStore};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::options::ListOptions;

/// Overall cap on rows a search stream will paginate.
pub const SEARCH_STREAM_LIMIT: usize = 1000;
/// Overall cap on rows a get-all stream will page through.
pub const GET_ALL_STREAM_LIMIT: usize = 10_000;

const CHANNEL_CAPACITY: usize = 1;

/// One unit of streamed delivery.
#[derive(Debug)]
pub struct MemoryBatch {
    /// Rows in this batch; empty on error batches.
    pub memories: Vec<Memory>,
    /// Zero-based emission index.
    pub batch_index: usize,
    /// True exactly once, on the final successful batch.
    pub is_last_batch: bool,
    /// Set on the terminal batch of a failed or cancelled stream.
    pub error: Option<MemoryError>,
}

impl MemoryBatch {
    fn page(memories: Vec<Memory>, batch_index: usize, is_last_batch: bool) -> Self {
        Self {
            memories,
            batch_index,
            is_last_batch,
            error: None,
        }
    }

    fn failed(batch_index: usize, error: MemoryError) -> Self {
        Self {
            memories: Vec::new(),
            batch_index,
            is_last_batch: false,
            error: Some(error),
        }
    }
}

/// Streams an already-materialised result set in `batch_size` chunks.
///
/// Used by `search_stream`, which performs a single bounded search and
/// paginates in memory.
pub(crate) fn stream_chunks(
    op: &'static str,
    results: Vec<Memory>,
    batch_size: usize,
    cancellation: CancellationToken,
) -> Receiver<MemoryBatch> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let batch_size = batch_size.max(1);

    tokio::spawn(async move {
        let total = results.len();
        let mut chunks: Vec<Vec<Memory>> = Vec::new();
        let mut results = results;
        while !results.is_empty() {
            let rest = results.split_off(batch_size.min(results.len()));
            chunks.push(results);
            results = rest;
        }
        if chunks.is_empty() {
            chunks.push(Vec::new());
        }

        debug!(total, batches = chunks.len(), "streaming search results");
        let last = chunks.len() - 1;
        for (index, memories) in chunks.into_iter().enumerate() {
            if send_or_cancel(
                &tx,
                &cancellation,
                op,
                MemoryBatch::page(memories, index, index == last),
                index,
            )
            .await
            .is_err()
            {
                return;
            }
        }
    });
    rx
}

/// Streams a listing by paging through the store.
pub(crate) fn stream_pages(
    op: &'static str,
    store: Arc<dyn VectorStore>,
    options: ListOptions,
    batch_size: usize,
) -> Receiver<MemoryBatch> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let batch_size = batch_size.max(1);
    let overall = options.limit.min(GET_ALL_STREAM_LIMIT).max(1);

    tokio::spawn(async move {
        let cancellation = options.cancellation.clone();
        let mut offset = options.offset;
        let mut delivered = 0usize;
        let mut index = 0usize;

        loop {
            if cancellation.is_cancelled() {
                let _ = tx
                    .send(MemoryBatch::failed(index, MemoryError::cancelled(op)))
                    .await;
                return;
            }

            let page_size = batch_size.min(overall - delivered);
            let request = {
                let mut request = ListRequest::new(page_size).with_offset(offset);
                if let Some(user_id) = &options.user_id {
                    request = request.with_user_id(user_id.clone());
                }
                if let Some(agent_id) = &options.agent_id {
                    request = request.with_agent_id(agent_id.clone());
                }
                request
            };

            let page = match store.get_all(&request).await {
                Ok(page) => page,
                Err(err) => {
                    let _ = tx.send(MemoryBatch::failed(index, err.in_op(op))).await;
                    return;
                }
            };

            let fetched = page.len();
            offset += fetched;
            delivered += fetched;
            // A short page or the overall cap ends the stream.
            let is_last = fetched < page_size || delivered >= overall;

            if send_or_cancel(
                &tx,
                &cancellation,
                op,
                MemoryBatch::page(page, index, is_last),
                index,
            )
            .await
            .is_err()
                || is_last
            {
                return;
            }
            index += 1;
        }
    });
    rx
}

/// Emits a single error batch; used when the stream fails before any page
/// is produced.
pub(crate) fn stream_failure(error: MemoryError) -> Receiver<MemoryBatch> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let _ = tx.send(MemoryBatch::failed(0, error)).await;
    });
    rx
}

/// Sends a batch, racing cancellation. On cancellation a terminal error
/// batch is emitted instead. `Err` means the stream must stop.
async fn send_or_cancel(
    tx: &Sender<MemoryBatch>,
    cancellation: &CancellationToken,
    op: &'static str,
    batch: MemoryBatch,
    index: usize,
) -> Result<()> {
    if cancellation.is_cancelled() {
        let _ = tx.send(MemoryBatch::failed(index, MemoryError::cancelled(op))).await;
        return Err(MemoryError::cancelled(op));
    }

    tokio::select! {
        () = cancellation.cancelled() => {
            let _ = tx.send(MemoryBatch::failed(index, MemoryError::cancelled(op))).await;
            Err(MemoryError::cancelled(op))
        }
        sent = tx.send(batch) => {
            sent.map_err(|_| MemoryError::cancelled(op))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memories(count: usize) -> Vec<Memory> {
        (0..count)
            .map(|i| Memory::new(i as i64 + 1, "u1", format!("m{i}")))
            .collect()
    }

    #[tokio::test]
    async fn chunk_stream_has_monotone_indexes_and_one_last_batch() {
        let mut rx = stream_chunks("search_stream", memories(8), 3, CancellationToken::new());

        let mut sizes = Vec::new();
        let mut last_flags = Vec::new();
        let mut expected_index = 0;
        while let Some(batch) = rx.recv().await {
            assert!(batch.error.is_none());
            assert_eq!(batch.batch_index, expected_index);
            expected_index += 1;
            sizes.push(batch.memories.len());
            last_flags.push(batch.is_last_batch);
        }

        assert_eq!(sizes, vec![3, 3, 2]);
        assert_eq!(last_flags, vec![false, false, true]);
    }

    #[tokio::test]
    async fn empty_result_is_one_empty_last_batch() {
        let mut rx = stream_chunks("search_stream", Vec::new(), 5, CancellationToken::new());
        let batch = rx.recv().await.unwrap();
        assert!(batch.memories.is_empty());
        assert!(batch.is_last_batch);
        assert!(batch.error.is_none());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancellation_emits_a_terminal_error_batch() {
        let token = CancellationToken::new();
        let mut rx = stream_chunks("search_stream", memories(20), 2, token.clone());

        let first = rx.recv().await.unwrap();
        assert!(first.error.is_none());
        token.cancel();

        // Everything after the cancel resolves to one error batch.
        let mut terminal = None;
        while let Some(batch) = rx.recv().await {
            if let Some(error) = &batch.error {
                assert!(error.is_cancelled());
                terminal = Some(batch.batch_index);
            }
        }
        assert!(terminal.is_some());
    }

    #[tokio::test]
    async fn failure_stream_emits_one_error_batch() {
        let mut rx = stream_failure(MemoryError::storage("search_stream", "backend down"));
        let batch = rx.recv().await.unwrap();
        assert!(batch.error.is_some());
        assert!(!batch.is_last_batch);
        assert!(rx.recv().await.is_none());
    }
}
