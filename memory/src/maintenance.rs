//! Lifecycle maintenance sweep.
//!
//! Applies the retention model's verdicts over a tenant's memories:
//! forgotten memories are deleted, archive candidates are tagged, and
//! promotions get their strength reinforced. Individual failures are
//! logged and skipped; the sweep itself only fails when listing does.

use mnema_core::memory::keys;
use mnema_core::store::{AccessFilter, ListRequest, MemoryState};
use mnema_core::{Memory, MemoryError, Result};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::coordinator::MemoryClient;
use crate::ebbinghaus::LifecycleVerdict;

const SWEEP_PAGE_SIZE: usize = 500;
const SWEEP_CAP: usize = 10_000;

/// Counts reported by a maintenance sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Memories examined.
    pub scanned: usize,
    /// Memories deleted by a forget verdict.
    pub forgotten: usize,
    /// Memories tagged as archived.
    pub archived: usize,
    /// Memories reinforced by a promote verdict.
    pub promoted: usize,
}

impl MemoryClient {
    /// Sweeps one tenant's memories through the lifecycle verdicts.
    ///
    /// Requires the retention model; fails with
    /// [`InvalidConfig`](mnema_core::ErrorKind::InvalidConfig) otherwise.
    pub async fn run_maintenance(&self, user_id: &str) -> Result<MaintenanceReport> {
        const OP: &str = "run_maintenance";

        let engine = self.engine().cloned().ok_or_else(|| {
            MemoryError::invalid_config(OP, "retention model is not configured")
        })?;
        let access = AccessFilter::user(user_id);
        let _write = self.write_guard().await;

        // Materialise the sweep set first so deletions cannot shift pages
        // out from under the listing.
        let mut memories: Vec<Memory> = Vec::new();
        loop {
            let request = ListRequest::new(SWEEP_PAGE_SIZE.min(SWEEP_CAP - memories.len()))
                .with_user_id(user_id)
                .with_offset(memories.len());
            let page = self
                .store()
                .get_all(&request)
                .await
                .map_err(|err| err.in_op(OP))?;
            let fetched = page.len();
            memories.extend(page);
            if fetched < SWEEP_PAGE_SIZE || memories.len() >= SWEEP_CAP {
                break;
            }
        }

        let now = OffsetDateTime::now_utc();
        let mut report = MaintenanceReport {
            scanned: memories.len(),
            ..MaintenanceReport::default()
        };

        for mut memory in memories {
            match engine.verdict(&memory, now) {
                LifecycleVerdict::Forget => {
                    match self.store().delete(memory.id, &access).await {
                        Ok(()) => report.forgotten += 1,
                        Err(err) => warn!(id = memory.id, error = %err, "forget failed"),
                    }
                }
                LifecycleVerdict::Archive => {
                    if memory
                        .metadata
                        .get(keys::ARCHIVED)
                        .and_then(serde_json::Value::as_bool)
                        .unwrap_or(false)
                    {
                        continue;
                    }
                    memory.metadata.insert(keys::ARCHIVED.into(), json!(true));
                    let state = MemoryState {
                        retention_strength: memory.retention_strength,
                        last_accessed_at: memory.last_accessed_at,
                        metadata: memory.metadata.clone(),
                    };
                    match self.store().update_state(memory.id, &state, &access).await {
                        Ok(()) => report.archived += 1,
                        Err(err) => warn!(id = memory.id, error = %err, "archive failed"),
                    }
                }
                LifecycleVerdict::Promote => {
                    let current =
                        engine.retention(memory.created_at, memory.last_accessed_at, now);
                    let reinforced = engine.reinforce(current);
                    memory
                        .metadata
                        .insert(keys::RETENTION_STRENGTH.into(), json!(reinforced));
                    memory.metadata.insert(
                        keys::INTELLIGENCE.into(),
                        json!({ "tier": engine.classify(reinforced).as_str() }),
                    );
                    let state = MemoryState {
                        retention_strength: reinforced,
                        last_accessed_at: memory.last_accessed_at,
                        metadata: memory.metadata.clone(),
                    };
                    match self.store().update_state(memory.id, &state, &access).await {
                        Ok(()) => report.promoted += 1,
                        Err(err) => warn!(id = memory.id, error = %err, "promote failed"),
                    }
                }
                LifecycleVerdict::Keep => {}
            }
        }

        info!(
            user_id,
            scanned = report.scanned,
            forgotten = report.forgotten,
            archived = report.archived,
            promoted = report.promoted,
            "maintenance sweep finished"
        );
        Ok(report)
    }
}
