//! Ebbinghaus retention model.
//!
//! Pure functions over memory records: exponential decay, reinforcement on
//! access, tier classification, review scheduling, and lifecycle verdicts.
//! None of them can fail; everything is a total function of its inputs.

use mnema_core::config::IntelligenceConfig;
use mnema_core::{Memory, MemoryTier};
use time::{Duration, OffsetDateTime};

/// Review intervals in hours, ascending.
pub const REVIEW_INTERVALS_HOURS: [f64; 5] = [1.0, 6.0, 24.0, 72.0, 168.0];

/// Disposition of a memory under the lifecycle verdicts.
///
/// Precedence when several predicates hold: forget, then archive, then
/// promote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleVerdict {
    /// Remove the memory.
    Forget,
    /// Keep the memory but mark it archived.
    Archive,
    /// Reinforce the memory into a stronger tier.
    Promote,
    /// No action.
    Keep,
}

/// Retention math parameterised by an [`IntelligenceConfig`].
#[derive(Debug, Clone)]
pub struct EbbinghausEngine {
    config: IntelligenceConfig,
}

impl EbbinghausEngine {
    /// Creates an engine with the given parameters.
    #[must_use]
    pub const fn new(config: IntelligenceConfig) -> Self {
        Self { config }
    }

    /// Returns the configured parameters.
    #[must_use]
    pub const fn config(&self) -> &IntelligenceConfig {
        &self.config
    }

    /// Current retention `R = clamp(exp(-λ·h/24), 0, 1)` where `h` is hours
    /// since the last access (or creation, when never accessed).
    #[must_use]
    pub fn retention(
        &self,
        created_at: OffsetDateTime,
        last_accessed_at: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> f64 {
        let reference = last_accessed_at.unwrap_or(created_at);
        let hours = hours_between(reference, now).max(0.0);
        (-self.config.decay_rate * hours / 24.0).exp().clamp(0.0, 1.0)
    }

    /// Reinforcement on access: `R' = min(1, R + φ·(1-R))`.
    #[must_use]
    pub fn reinforce(&self, retention: f64) -> f64 {
        (retention + self.config.reinforcement_factor * (1.0 - retention)).min(1.0)
    }

    /// Classifies retention into a tier against the configured thresholds.
    #[must_use]
    pub fn classify(&self, retention: f64) -> MemoryTier {
        if retention >= self.config.long_term_threshold {
            MemoryTier::LongTerm
        } else if retention >= self.config.short_term_threshold {
            MemoryTier::ShortTerm
        } else {
            MemoryTier::Working
        }
    }

    /// Decay rate adjusted for the tier: working memories decay twice as
    /// fast, short-term 1.5×, long-term at the base rate.
    #[must_use]
    pub fn adjusted_decay_rate(&self, tier: MemoryTier) -> f64 {
        match tier {
            MemoryTier::Working => 2.0 * self.config.decay_rate,
            MemoryTier::ShortTerm => 1.5 * self.config.decay_rate,
            MemoryTier::LongTerm => self.config.decay_rate,
        }
    }

    /// Ascending review times: `created_at + max(0.5, I·(1 - 0.3·importance))`
    /// hours for each base interval `I`.
    #[must_use]
    pub fn review_schedule(
        &self,
        created_at: OffsetDateTime,
        importance: f64,
    ) -> Vec<OffsetDateTime> {
        REVIEW_INTERVALS_HOURS
            .iter()
            .map(|interval| {
                let scaled = (interval * (1.0 - 0.3 * importance)).max(0.5);
                created_at + hours_duration(scaled)
            })
            .collect()
    }

    /// Next review derived from current strength: `now + 24·(1 + 10·R)`
    /// hours.
    #[must_use]
    pub fn next_review(&self, retention: f64, now: OffsetDateTime) -> OffsetDateTime {
        now + hours_duration(24.0 * (1.0 + 10.0 * retention))
    }

    /// True when the memory qualifies for promotion: three or more
    /// accesses, or older than a day, or important enough on its own.
    #[must_use]
    pub fn should_promote(&self, memory: &Memory, now: OffsetDateTime) -> bool {
        memory.access_count() >= 3
            || hours_between(memory.created_at, now) > 24.0
            || memory.importance_score() >= self.config.short_term_threshold
    }

    /// True when the memory should be forgotten: strength under the working
    /// threshold, or never accessed and older than a week.
    #[must_use]
    pub fn should_forget(&self, memory: &Memory, now: OffsetDateTime) -> bool {
        memory.retention_strength < self.config.working_threshold
            || (memory.access_count() == 0 && hours_between(memory.created_at, now) > 7.0 * 24.0)
    }

    /// True when the memory should be archived: older than thirty days, or
    /// of negligible importance.
    #[must_use]
    pub fn should_archive(&self, memory: &Memory, now: OffsetDateTime) -> bool {
        hours_between(memory.created_at, now) > 30.0 * 24.0
            || memory.importance_score() < self.config.working_threshold
    }

    /// Combined verdict with forget > archive > promote precedence.
    #[must_use]
    pub fn verdict(&self, memory: &Memory, now: OffsetDateTime) -> LifecycleVerdict {
        if self.should_forget(memory, now) {
            LifecycleVerdict::Forget
        } else if self.should_archive(memory, now) {
            LifecycleVerdict::Archive
        } else if self.should_promote(memory, now) {
            LifecycleVerdict::Promote
        } else {
            LifecycleVerdict::Keep
        }
    }
}

fn hours_between(earlier: OffsetDateTime, later: OffsetDateTime) -> f64 {
    (later - earlier).as_seconds_f64() / 3600.0
}

#[allow(clippy::cast_possible_truncation)]
fn hours_duration(hours: f64) -> Duration {
    Duration::seconds((hours * 3600.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> EbbinghausEngine {
        EbbinghausEngine::new(IntelligenceConfig::default())
    }

    #[test]
    fn retention_after_24_hours_matches_curve() {
        let engine = engine();
        let now = OffsetDateTime::now_utc();
        let created = now - Duration::hours(24);

        let retention = engine.retention(created, None, now);
        assert!((retention - (-0.1f64).exp()).abs() < 1e-9);
        assert!((retention - 0.9048).abs() < 1e-3);
        assert_eq!(engine.classify(retention), MemoryTier::LongTerm);
    }

    #[test]
    fn retention_is_one_at_zero_hours_and_non_increasing() {
        let engine = engine();
        let now = OffsetDateTime::now_utc();
        assert!((engine.retention(now, None, now) - 1.0).abs() < f64::EPSILON);

        let mut previous = 1.0;
        for hours in [1, 6, 24, 72, 168, 720] {
            let retention = engine.retention(now - Duration::hours(hours), None, now);
            assert!(retention <= previous);
            assert!((0.0..=1.0).contains(&retention));
            previous = retention;
        }
    }

    #[test]
    fn retention_uses_last_access_when_present() {
        let engine = engine();
        let now = OffsetDateTime::now_utc();
        let created = now - Duration::hours(240);
        let accessed = now - Duration::hours(1);

        let stale = engine.retention(created, None, now);
        let refreshed = engine.retention(created, Some(accessed), now);
        assert!(refreshed > stale);
    }

    #[test]
    fn reinforce_is_bounded_and_fixed_at_one() {
        let engine = engine();
        for retention in [0.0, 0.2, 0.5, 0.9, 1.0] {
            let reinforced = engine.reinforce(retention);
            assert!(reinforced >= retention);
            assert!(reinforced <= 1.0);
        }
        assert!((engine.reinforce(1.0) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn classification_partitions_the_unit_interval() {
        let engine = engine();
        assert_eq!(engine.classify(0.0), MemoryTier::Working);
        assert_eq!(engine.classify(0.59), MemoryTier::Working);
        assert_eq!(engine.classify(0.6), MemoryTier::ShortTerm);
        assert_eq!(engine.classify(0.79), MemoryTier::ShortTerm);
        assert_eq!(engine.classify(0.8), MemoryTier::LongTerm);
        assert_eq!(engine.classify(1.0), MemoryTier::LongTerm);
    }

    #[test]
    fn adjusted_decay_rates() {
        let engine = engine();
        assert!((engine.adjusted_decay_rate(MemoryTier::Working) - 0.2).abs() < 1e-12);
        assert!((engine.adjusted_decay_rate(MemoryTier::ShortTerm) - 0.15).abs() < 1e-12);
        assert!((engine.adjusted_decay_rate(MemoryTier::LongTerm) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn review_schedule_is_ascending_and_scaled() {
        let engine = engine();
        let created = OffsetDateTime::now_utc();

        let plain = engine.review_schedule(created, 0.0);
        assert_eq!(plain.len(), REVIEW_INTERVALS_HOURS.len());
        for window in plain.windows(2) {
            assert!(window[0] < window[1]);
        }
        assert_eq!(plain[0], created + Duration::hours(1));

        // Importance shortens the intervals.
        let important = engine.review_schedule(created, 1.0);
        for (fast, slow) in important.iter().zip(plain.iter()) {
            assert!(fast <= slow);
        }
    }

    #[test]
    fn review_schedule_clamps_to_half_hour() {
        let mut config = IntelligenceConfig::default();
        config.decay_rate = 0.1;
        let engine = EbbinghausEngine::new(config);
        let created = OffsetDateTime::now_utc();

        // With importance 1.0 the first interval would be 0.7h; force the
        // clamp with an importance above the formula's range.
        let schedule = engine.review_schedule(created, 3.0);
        assert_eq!(schedule[0], created + Duration::seconds(30 * 60));
    }

    #[test]
    fn next_review_grows_with_strength() {
        let engine = engine();
        let now = OffsetDateTime::now_utc();
        let weak = engine.next_review(0.0, now);
        let strong = engine.next_review(1.0, now);
        assert_eq!(weak, now + Duration::hours(24));
        assert_eq!(strong, now + Duration::hours(264));
    }

    #[test]
    fn verdict_precedence() {
        let engine = engine();
        let now = OffsetDateTime::now_utc();

        // Weak retention forgets even when archive/promote also hold.
        let mut memory = Memory::new(1, "u1", "weak");
        memory.retention_strength = 0.1;
        memory.created_at = now - Duration::days(40);
        assert_eq!(engine.verdict(&memory, now), LifecycleVerdict::Forget);

        // Old but strong memories archive.
        let mut memory = Memory::new(2, "u1", "old");
        memory.retention_strength = 0.9;
        memory.created_at = now - Duration::days(40);
        memory.metadata.insert(
            mnema_core::memory::keys::IMPORTANCE_SCORE.into(),
            serde_json::json!(0.9),
        );
        memory.metadata.insert(
            mnema_core::memory::keys::ACCESS_COUNT.into(),
            serde_json::json!(5),
        );
        assert_eq!(engine.verdict(&memory, now), LifecycleVerdict::Archive);

        // Recent, important, frequently accessed memories promote.
        let mut memory = Memory::new(3, "u1", "hot");
        memory.retention_strength = 0.9;
        memory.created_at = now - Duration::hours(2);
        memory.metadata.insert(
            mnema_core::memory::keys::IMPORTANCE_SCORE.into(),
            serde_json::json!(0.7),
        );
        memory.metadata.insert(
            mnema_core::memory::keys::ACCESS_COUNT.into(),
            serde_json::json!(4),
        );
        assert_eq!(engine.verdict(&memory, now), LifecycleVerdict::Promote);
    }

    #[test]
    fn fresh_unremarkable_memory_is_archived_by_low_importance() {
        // With no importance score a fresh memory still falls under the
        // working threshold and is an archive candidate.
        let engine = engine();
        let now = OffsetDateTime::now_utc();
        let memory = Memory::new(4, "u1", "fresh");
        assert!(engine.should_archive(&memory, now));
    }
}
