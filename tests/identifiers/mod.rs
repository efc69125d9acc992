//! Snowflake Identifier Tests

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;

use delta_server::domain::{timestamp_of, EntityKind, Snowflake};
use delta_server::shared::clock::ManualClock;
use delta_server::shared::snowflake::SnowflakeGenerator;

use crate::common::start_time;

#[test]
fn test_ids_carry_kind_and_creation_time() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let generator = SnowflakeGenerator::with_clock(0, clock);

    let id = generator.next(EntityKind::Message).to_string();

    assert!(id.starts_with('m'));
    assert_eq!(timestamp_of(&id), Some(start_time().timestamp_millis()));
}

#[test]
fn test_timestamps_never_decrease_across_rollback() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let generator = SnowflakeGenerator::with_clock(3, clock.clone());

    let mut last = 0;
    for step in [10, -500, 0, 20, -2_000, 5_000] {
        clock.advance(Duration::milliseconds(step));
        let id = generator.next(EntityKind::User);
        assert!(id.timestamp() >= last, "timestamp went backwards at step {}", step);
        assert_eq!(id.shard(), 3);
        last = id.timestamp();
    }
}

#[test]
fn test_same_instant_calls_after_rollback_never_wrap() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let generator = SnowflakeGenerator::with_clock(0, clock.clone());
    let mut last = generator.next(EntityKind::Message).timestamp();

    clock.advance(Duration::milliseconds(-500));
    for call in 0..64 {
        let ts = generator.next(EntityKind::Message).timestamp();
        assert!(ts >= last, "timestamp went backwards on call {}", call);
        last = ts;
    }
    assert!(last < start_time().timestamp_millis() as u64 + 60_000);
}

#[test]
fn test_ids_from_distinct_milliseconds_sort_by_time() {
    let clock = Arc::new(ManualClock::new(start_time()));
    let generator = SnowflakeGenerator::with_clock(0, clock.clone());

    let ids: Vec<Snowflake> = (0..100)
        .map(|_| {
            clock.advance(Duration::milliseconds(1));
            generator.next(EntityKind::Message)
        })
        .collect();

    let unique: HashSet<String> = ids.iter().map(|id| id.to_string()).collect();
    assert_eq!(unique.len(), ids.len());
    assert!(ids.windows(2).all(|w| w[0].value() < w[1].value()));
}

#[test]
fn test_concurrent_generation_keeps_per_thread_order() {
    let generator = Arc::new(SnowflakeGenerator::default());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let generator = generator.clone();
            std::thread::spawn(move || {
                (0..250)
                    .map(|_| generator.next(EntityKind::Channel).timestamp())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        let timestamps = handle.join().unwrap();
        assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn test_parse_accepts_generated_ids() {
    let generator = SnowflakeGenerator::default();

    let id = generator.next(EntityKind::Guild);
    let parsed: Snowflake = id.to_string().parse().unwrap();

    assert_eq!(parsed, id);
    assert_eq!(parsed.kind(), EntityKind::Guild);
}

#[test]
fn test_timestamp_of_rejects_malformed_input() {
    for input in ["", "u", "x123", "u12a", "u-5", "u99999999999999999999999"] {
        assert_eq!(timestamp_of(input), None, "accepted {:?}", input);
    }
}
