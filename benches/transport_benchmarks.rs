use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use mymusic_transport::audio::pool::ObjectPool;
use mymusic_transport::audio::render::Voice;
use mymusic_transport::scheduling::lookahead::{LookaheadLimits, LookaheadScheduler};
use mymusic_transport::scheduling::queue::{EventQueue, ReadyEvent};
use mymusic_transport::sequencer::pattern::Pattern;
use mymusic_transport::sequencer::timeline::StepPosition;
use mymusic_transport::sequencer::transport::PositionClock;

fn dense_pattern(notes_per_step: u64) -> Pattern {
    let mut pattern = Pattern::new(1, "Bench".to_string());
    for step in 0..64u64 {
        for voice in 0..notes_per_step {
            pattern.insert_note(
                voice as u32,
                (36 + voice) as u8,
                StepPosition::from_steps(step),
                StepPosition::from_steps(1),
                100,
            );
        }
    }
    pattern
}

/// Acquire/release cycle on the voice pool (runs in the render callback)
fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool");

    for capacity in [16usize, 64, 256] {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                let mut pool: ObjectPool<Voice> = ObjectPool::with_default("voices", capacity);
                let mut handles = Vec::with_capacity(capacity);
                b.iter(|| {
                    while let Ok(handle) = pool.acquire() {
                        handles.push(handle);
                    }
                    for handle in handles.drain(..) {
                        let _ = pool.release(black_box(handle));
                    }
                });
            },
        );
    }
    group.finish();
}

/// Materialize one lookahead window and drain it
fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_queue");

    for notes_per_step in [1u64, 4, 16] {
        let pattern = dense_pattern(notes_per_step);
        let mut clock = PositionClock::default();
        clock.play(Some(0.0), 0.0);
        let snapshot = clock.snapshot(0.0);

        group.bench_with_input(
            BenchmarkId::new("window_100ms", notes_per_step),
            &pattern,
            |b, pattern| {
                let mut queue = EventQueue::new(4096);
                let mut ready: Vec<ReadyEvent> = Vec::with_capacity(4096);
                b.iter(|| {
                    queue.clear();
                    let _ = queue.materialize_up_to(black_box(0.1), &snapshot, pattern);
                    ready.clear();
                    queue.pop_ready(0.1, &mut ready);
                    for event in &ready {
                        let _ = queue.acknowledge(event.handle);
                    }
                });
            },
        );
    }
    group.finish();
}

fn bench_lookahead(c: &mut Criterion) {
    c.bench_function("lookahead_compute_window", |b| {
        let mut scheduler = LookaheadScheduler::new(LookaheadLimits::default());
        let mut load = 0.0;
        b.iter(|| {
            load = (load + 7.0) % 100.0;
            black_box(scheduler.compute_window(black_box(128.0), black_box(12.0), load))
        });
    });
}

criterion_group!(benches, bench_pool, bench_queue, bench_lookahead);
criterion_main!(benches);
