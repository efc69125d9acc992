//! Snowflake ID Generator
//!
//! Mints kind-tagged, time-ordered identifiers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;

use crate::domain::value_objects::snowflake::{
    EntityKind, Snowflake, DELTA_EPOCH, FIELD_MASK, MAX_TIMESTAMP, RANDOM_MASK, SHARD_SHIFT,
    TIMESTAMP_SHIFT,
};
use crate::shared::clock::{Clock, SystemClock};

/// Furthest a reflected timestamp may lead the last one (ms).
pub const MAX_REFLECTION_MS: u64 = 10_000;

/// Snowflake ID generator
///
/// Timestamps handed out by one generator never decrease. When the wall
/// clock reads at or before the last recorded timestamp, the generator
/// reflects it forward (`2 * last - now`), which keeps local ordering but
/// not wall-clock accuracy. A reflection leading `last` by more than
/// [`MAX_REFLECTION_MS`] holds at `last` instead, and every timestamp
/// saturates at [`MAX_TIMESTAMP`].
pub struct SnowflakeGenerator {
    shard_id: u64,
    last_timestamp: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl SnowflakeGenerator {
    /// Create a new snowflake generator on the system clock
    pub fn new(shard_id: u8) -> Self {
        Self::with_clock(shard_id, Arc::new(SystemClock))
    }

    pub fn with_clock(shard_id: u8, clock: Arc<dyn Clock>) -> Self {
        Self {
            shard_id: (shard_id as u64) & FIELD_MASK, // 5 bits
            last_timestamp: AtomicU64::new(0),
            clock,
        }
    }

    /// Generate a new snowflake ID of the given kind
    pub fn next(&self, kind: EntityKind) -> Snowflake {
        let timestamp = self.next_timestamp();
        // Disambiguation only; not security sensitive.
        let random = rand::rng().random_range(0..=RANDOM_MASK);

        let value = ((timestamp - DELTA_EPOCH) << TIMESTAMP_SHIFT)
            | (self.shard_id << SHARD_SHIFT)
            | random;

        Snowflake::new(kind, value)
    }

    /// Current time in ms, reflected forward on clock rollback.
    fn next_timestamp(&self) -> u64 {
        let now = self.current_timestamp();
        let previous = self
            .last_timestamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(Self::reflect(last, now))
            })
            // The closure never returns None.
            .unwrap_or_else(|last| last);

        Self::reflect(previous, now)
    }

    fn reflect(last: u64, now: u64) -> u64 {
        if last == 0 || now > last {
            return now;
        }
        let lead = last - now;
        if lead <= MAX_REFLECTION_MS {
            (last + lead).min(MAX_TIMESTAMP)
        } else {
            last
        }
    }

    /// Current timestamp in milliseconds, within the encodable range
    fn current_timestamp(&self) -> u64 {
        let millis = self.clock.now().timestamp_millis();
        u64::try_from(millis)
            .unwrap_or(0)
            .clamp(DELTA_EPOCH, MAX_TIMESTAMP)
    }
}

impl Default for SnowflakeGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::snowflake::timestamp_of;
    use crate::shared::clock::ManualClock;
    use chrono::{Duration, TimeZone, Utc};

    fn manual_generator() -> (Arc<ManualClock>, SnowflakeGenerator) {
        let clock = Arc::new(ManualClock::new(
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        ));
        let generator = SnowflakeGenerator::with_clock(0, clock.clone());
        (clock, generator)
    }

    #[test]
    fn test_generate_tags_kind() {
        let gen = SnowflakeGenerator::default();
        assert!(gen.next(EntityKind::User).to_string().starts_with('u'));
        assert!(gen.next(EntityKind::Message).to_string().starts_with('m'));
    }

    #[test]
    fn test_extract_timestamp() {
        let gen = SnowflakeGenerator::default();
        let id = gen.next(EntityKind::Channel);
        let ts = timestamp_of(&id.to_string()).unwrap();
        let now = Utc::now().timestamp_millis();
        assert!(ts <= now);
        assert!(ts > now - 1000); // Within 1 second
    }

    #[test]
    fn test_reserved_bits_are_zero_by_default() {
        let gen = SnowflakeGenerator::default();
        let id = gen.next(EntityKind::Guild);
        assert_eq!(id.shard(), 0);
        assert_eq!(id.sequence(), 0);
    }

    #[test]
    fn test_shard_id_is_masked() {
        let gen = SnowflakeGenerator::new(0xFF);
        assert_eq!(gen.next(EntityKind::User).shard(), 0x1F);
    }

    #[test]
    fn test_same_millisecond_keeps_timestamp() {
        let (_clock, gen) = manual_generator();
        let a = gen.next(EntityKind::Message);
        let b = gen.next(EntityKind::Message);
        assert_eq!(a.timestamp(), b.timestamp());
    }

    #[test]
    fn test_clock_rollback_is_reflected_forward() {
        let (clock, gen) = manual_generator();
        let before = gen.next(EntityKind::Message).timestamp();

        clock.advance(Duration::milliseconds(-500));
        let after = gen.next(EntityKind::Message).timestamp();

        assert_eq!(after, before + 500);
    }

    #[test]
    fn test_timestamps_never_decrease_across_jumps() {
        let (clock, gen) = manual_generator();
        let steps = [5_i64, -30, 0, 12, -2_000, 1, 3_000, -1, 0, 40];
        let mut last = gen.next(EntityKind::User).timestamp();

        for step in steps {
            clock.advance(Duration::milliseconds(step));
            let ts = gen.next(EntityKind::User).timestamp();
            assert!(ts >= last, "timestamp went backwards after step {step}");
            last = ts;
        }
    }

    #[test]
    fn test_repeated_calls_after_rollback_stay_ordered_and_bounded() {
        let (clock, gen) = manual_generator();
        let start = gen.next(EntityKind::Message).timestamp();
        clock.advance(Duration::milliseconds(-500));

        let mut last = start;
        for call in 0..100 {
            let id = gen.next(EntityKind::Message);
            assert!(id.timestamp() >= last, "timestamp went backwards on call {call}");
            assert!(id.timestamp() <= start + 2 * MAX_REFLECTION_MS + 500);
            assert_eq!(timestamp_of(&id.to_string()), Some(id.timestamp() as i64));
            last = id.timestamp();
        }
    }

    #[test]
    fn test_large_rollback_holds_last_timestamp() {
        let (clock, gen) = manual_generator();
        let before = gen.next(EntityKind::User).timestamp();

        clock.advance(Duration::hours(-1));

        assert_eq!(gen.next(EntityKind::User).timestamp(), before);
        assert_eq!(gen.next(EntityKind::User).timestamp(), before);
    }

    #[test]
    fn test_timestamp_saturates_at_field_limit() {
        let clock = Arc::new(ManualClock::new(
            Utc.timestamp_millis_opt(MAX_TIMESTAMP as i64 + 5_000).unwrap(),
        ));
        let gen = SnowflakeGenerator::with_clock(0, clock.clone());

        assert_eq!(gen.next(EntityKind::User).timestamp(), MAX_TIMESTAMP);
        clock.advance(Duration::milliseconds(-10_000));
        for _ in 0..64 {
            assert_eq!(gen.next(EntityKind::User).timestamp(), MAX_TIMESTAMP);
        }
    }

    #[test]
    fn test_clock_before_epoch_clamps() {
        let clock = Arc::new(ManualClock::new(Utc.timestamp_millis_opt(0).unwrap()));
        let gen = SnowflakeGenerator::with_clock(0, clock);
        assert_eq!(gen.next(EntityKind::User).timestamp(), DELTA_EPOCH);
    }
}
