//! Property tests for the transport clock, pools and batching
//!
//! Random operation sequences are drawn from a seeded generator so failures
//! reproduce exactly.

use mymusic_transport::audio::pool::{ObjectPool, PoolError};
use mymusic_transport::audio::render::Voice;
use mymusic_transport::messaging::batcher::{
    BatcherLimits, ParameterBatch, ParameterBatcher, SetOptions,
};
use mymusic_transport::sequencer::timeline::{LoopRegion, StepPosition, Tempo};
use mymusic_transport::sequencer::transport::{PositionClock, PositionConfirmation, TransportState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SEED: u64 = 0x5EED_7A5C;

fn steps(n: u64) -> StepPosition {
    StepPosition::from_steps(n)
}

/// Stop always returns the playhead to zero, whatever came before
#[test]
fn test_stop_always_returns_to_zero() {
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut clock = PositionClock::default();
    let mut now = 0.0;

    for _ in 0..500 {
        now += rng.gen_range(0.0..0.5);
        match rng.gen_range(0..5) {
            0 => {
                clock.play(Some(rng.gen_range(0.0..128.0)), now);
            }
            1 => {
                clock.pause(now);
            }
            2 => {
                clock.seek(rng.gen_range(0.0..256.0), now);
            }
            3 => {
                let _ = clock.set_tempo(rng.gen_range(Tempo::MIN_BPM..=Tempo::MAX_BPM), now);
            }
            _ => {
                clock.confirm(PositionConfirmation {
                    generation: clock.generation(),
                    rendered_until: now,
                });
            }
        }

        if rng.gen_bool(0.2) {
            clock.stop(now);
            assert_eq!(clock.state(), TransportState::Stopped);
            assert_eq!(clock.position(), StepPosition::ZERO);
        }
    }
}

/// With a loop enabled, every observed position stays inside the region
#[test]
fn test_loop_positions_stay_in_region() {
    let mut rng = StdRng::seed_from_u64(SEED ^ 1);

    for _ in 0..50 {
        let start = rng.gen_range(0..32u64);
        let end = start + rng.gen_range(1..32u64);
        let mut clock = PositionClock::new(Tempo::new(rng.gen_range(60.0..200.0)), 4);
        clock
            .set_loop(start as f64, end as f64, true, 0.0)
            .expect("valid loop");
        clock.play(Some(start as f64), 0.0);

        let mut now = 0.0;
        for _ in 0..100 {
            now += rng.gen_range(0.001..0.25);
            clock.confirm(PositionConfirmation {
                generation: clock.generation(),
                rendered_until: now,
            });
            let position = clock.position();
            assert!(
                position >= steps(start) && position < steps(end),
                "{} outside loop {}..{}",
                position,
                start,
                end
            );
            let snapshot = clock.snapshot(now);
            let predicted = snapshot.position_at(now + rng.gen_range(0.0..2.0));
            assert!(predicted >= steps(start) && predicted < steps(end));
        }
    }
}

#[test]
fn test_loop_wraps_past_end() {
    let mut clock = PositionClock::default();
    clock.set_loop(0.0, 64.0, true, 0.0).unwrap();
    clock.play(Some(60.0), 0.0);

    assert_eq!(clock.advance(steps(8)), steps(4));
}

#[test]
fn test_loop_region_wrap_matches_modulo() {
    let mut rng = StdRng::seed_from_u64(SEED ^ 2);
    let region = LoopRegion::new(steps(16), steps(48)).unwrap();

    for _ in 0..1000 {
        let ticks = rng.gen_range(0..steps(500).ticks());
        let wrapped = region.wrap(StepPosition::from_ticks(ticks));
        if ticks >= steps(16).ticks() {
            assert!(region.contains(wrapped));
            let expected = steps(16).ticks() + (ticks - steps(16).ticks()) % steps(32).ticks();
            assert_eq!(wrapped.ticks(), expected);
        }
    }
}

/// Confirmations never move the playhead backward
#[test]
fn test_confirmed_position_is_monotonic() {
    let mut rng = StdRng::seed_from_u64(SEED ^ 3);
    let mut clock = PositionClock::default();
    clock.play(Some(0.0), 0.0);

    let mut last = clock.position();
    for _ in 0..500 {
        clock.confirm(PositionConfirmation {
            generation: clock.generation(),
            rendered_until: rng.gen_range(0.0..30.0),
        });
        assert!(clock.position() >= last);
        last = clock.position();
    }
}

#[test]
fn test_voice_pool_capacity_is_fixed() {
    let mut pool: ObjectPool<Voice> = ObjectPool::with_default("voices", 5);
    let handles: Vec<_> = (0..5).map(|_| pool.acquire().unwrap()).collect();

    assert_eq!(pool.active_count(), 5);
    assert!(matches!(pool.acquire(), Err(PoolError::Exhausted { .. })));

    pool.release(handles[2]).unwrap();
    assert!(pool.acquire().is_ok());
    assert_eq!(pool.capacity(), 5);
    assert_eq!(pool.active_count() + pool.available(), 5);
}

#[test]
fn test_pool_accounting_under_random_churn() {
    let mut rng = StdRng::seed_from_u64(SEED ^ 4);
    let mut pool: ObjectPool<Voice> = ObjectPool::with_default("voices", 16);
    let mut held = Vec::new();

    for _ in 0..2000 {
        if rng.gen_bool(0.55) {
            match pool.acquire() {
                Ok(handle) => held.push(handle),
                Err(e) => assert!(e.is_exhausted()),
            }
        } else if !held.is_empty() {
            let handle = held.swap_remove(rng.gen_range(0..held.len()));
            pool.release(handle).unwrap();
            assert!(matches!(pool.release(handle), Err(PoolError::DoubleRelease { .. })));
        }
        assert_eq!(pool.active_count(), held.len());
        assert_eq!(pool.active_count() + pool.available(), pool.capacity());
    }
}

#[test]
fn test_batcher_keeps_last_value_per_key() {
    let mut batcher = ParameterBatcher::new(BatcherLimits::default());
    let mut sent: Vec<ParameterBatch> = Vec::new();

    batcher.set_parameter(3, "gain", 0.5, SetOptions::default(), 0.0, &mut sent);
    batcher.set_parameter(3, "gain", 0.8, SetOptions::default(), 0.001, &mut sent);
    assert!(sent.is_empty());

    batcher.flush_all(&mut sent);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].target, 3);
    assert_eq!(sent[0].len(), 1);
    assert_eq!(sent[0].get("gain"), Some(0.8));
}

#[test]
fn test_batcher_random_values_flush_latest() {
    let mut rng = StdRng::seed_from_u64(SEED ^ 5);
    let limits = BatcherLimits {
        max_entries: 1000,
        max_age: 10.0,
    };
    let mut batcher = ParameterBatcher::new(limits);
    let mut sent: Vec<ParameterBatch> = Vec::new();
    let keys = ["gain", "pan", "cutoff", "resonance"];
    let mut latest = std::collections::HashMap::new();

    for i in 0..200 {
        let target = rng.gen_range(0..4u32);
        let key = keys[rng.gen_range(0..keys.len())];
        let value: f32 = rng.gen_range(0.0..1.0);
        let now = i as f64 * 0.001;
        batcher.set_parameter(target, key, value, SetOptions::default(), now, &mut sent);
        latest.insert((target, key), value);
    }
    batcher.flush_all(&mut sent);

    let total: usize = sent.iter().map(ParameterBatch::len).sum();
    assert_eq!(total, latest.len());
    for batch in &sent {
        for (key, value) in &batch.values {
            assert_eq!(latest[&(batch.target, key.as_str())], *value);
        }
    }
}
