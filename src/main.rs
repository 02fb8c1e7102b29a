// MyMusic Transport - Headless demo
//
// Builds the engine from the user config, runs the render side on its own
// thread paced like an audio callback, and drives the control side at the
// configured tick rate while a short pattern loops.

use mymusic_transport::audio::render::EventSink;
use mymusic_transport::messaging::batcher::ParameterBatch;
use mymusic_transport::scheduling::event::NotePayload;
use mymusic_transport::sequencer::note::{AutomationPoint, TargetId};
use mymusic_transport::{
    EngineConfig, FrameTicker, Pattern, SetOptions, StepPosition, SyncConfig, SyncUpdate,
    SystemClock, TransportEngine,
};
use ringbuf::traits::Consumer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

const DEFAULT_RUN_SECONDS: f64 = 8.0;
const MIXER_TARGET: TargetId = 1;

/// Counts what the render side would have played
#[derive(Default)]
struct DemoCounters {
    note_ons: AtomicU64,
    note_offs: AtomicU64,
    automation: AtomicU64,
    loops: AtomicU64,
    batches: AtomicU64,
}

struct DemoSink {
    counters: Arc<DemoCounters>,
}

impl EventSink for DemoSink {
    fn note_on(&mut self, _note: NotePayload, _frame_offset: u32) {
        self.counters.note_ons.fetch_add(1, Ordering::Relaxed);
    }

    fn note_off(&mut self, _note: NotePayload, _frame_offset: u32) {
        self.counters.note_offs.fetch_add(1, Ordering::Relaxed);
    }

    fn automation(&mut self, _target: TargetId, _param: u32, _value: f32, _frame_offset: u32) {
        self.counters.automation.fetch_add(1, Ordering::Relaxed);
    }

    fn loop_boundary(&mut self, _start: StepPosition, _end: StepPosition, _frame_offset: u32) {
        self.counters.loops.fetch_add(1, Ordering::Relaxed);
    }

    fn apply_parameters(&mut self, _batch: &ParameterBatch) {
        self.counters.batches.fetch_add(1, Ordering::Relaxed);
    }
}

fn demo_pattern() -> Pattern {
    let mut pattern = Pattern::new(1, "Demo".to_string());
    // Four-on-the-floor kick plus an offbeat hat
    for beat in 0..4u64 {
        let step = StepPosition::from_steps(beat * 4);
        pattern.insert_note(0, 36, step, StepPosition::from_steps(1), 110);
        pattern.insert_note(
            1,
            42,
            step + StepPosition::from_steps(2),
            StepPosition::from_steps(1),
            80,
        );
    }
    pattern.add_automation(AutomationPoint {
        position: StepPosition::from_steps(8),
        target: MIXER_TARGET,
        param: 0,
        value: 0.5,
    });
    pattern
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let run_seconds = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse::<f64>().ok())
        .unwrap_or(DEFAULT_RUN_SECONDS);

    let config = match EngineConfig::default_path() {
        Some(path) => EngineConfig::load_or_default(&path),
        None => EngineConfig::default(),
    };

    let engine = match TransportEngine::build(&config) {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("Failed to build transport engine: {}", e);
            return;
        }
    };
    let TransportEngine {
        mut controller,
        mut render,
        mut notifications,
    } = engine;

    // Render thread, paced by the buffer duration
    let counters = Arc::new(DemoCounters::default());
    let running = Arc::new(AtomicBool::new(true));
    let buffer_size = config.audio.buffer_size;
    let buffer_period = Duration::from_secs_f64(config.cycle_budget());
    let render_thread = {
        let counters = Arc::clone(&counters);
        let running = Arc::clone(&running);
        thread::spawn(move || {
            let mut sink = DemoSink { counters };
            while running.load(Ordering::Relaxed) && render.process(buffer_size, &mut sink) {
                thread::sleep(buffer_period);
            }
        })
    };

    controller.subscribe(
        "status",
        SyncConfig::default(),
        Box::new(|update: &SyncUpdate| {
            log::trace!("Playhead at step {:.2}", update.step_position);
        }),
    );
    controller.set_pattern(demo_pattern());
    if let Err(e) = controller.set_loop(0.0, 16.0, true) {
        log::warn!("Loop rejected: {}", e);
    }
    controller.set_parameter(MIXER_TARGET, "gain", 0.8, SetOptions::default());
    controller.play(Some(0.0));

    let mut ticker = FrameTicker::new(SystemClock::new(), config.lookahead.tick_rate_hz);
    let mut tempo_changed = false;
    loop {
        match ticker.poll() {
            Some(tick) => {
                let report = controller.tick();

                if !tempo_changed && tick.now >= run_seconds / 2.0 {
                    tempo_changed = true;
                    if let Err(e) = controller.set_tempo(140.0) {
                        log::warn!("Tempo rejected: {}", e);
                    }
                }

                if tick.frame % 100 == 0 {
                    log::info!(
                        "step {} | window {:.0} ms | {} queued, {} in flight | {:?}",
                        report.position,
                        report.window * 1000.0,
                        controller.queued_events(),
                        controller.in_flight_events(),
                        controller.performance_status()
                    );
                    controller.suggest_level();
                }

                while let Some(notification) = notifications.try_pop() {
                    log::warn!("[{:?}] {}", notification.category, notification.message);
                }

                if tick.now >= run_seconds {
                    break;
                }
            }
            None => thread::sleep(Duration::from_secs_f64(ticker.time_until_next())),
        }
    }

    controller.stop();
    controller.tick();
    if !controller.shutdown() {
        running.store(false, Ordering::Relaxed);
    }
    if render_thread.join().is_err() {
        log::error!("Render thread panicked");
    }

    let stats = controller.stats();
    log::info!(
        "Done: {} note on / {} note off / {} automation / {} loop boundaries / {} parameter batches",
        counters.note_ons.load(Ordering::Relaxed),
        counters.note_offs.load(Ordering::Relaxed),
        counters.automation.load(Ordering::Relaxed),
        counters.loops.load(Ordering::Relaxed),
        counters.batches.load(Ordering::Relaxed)
    );
    log::info!(
        "Scheduler: {} materialized, {} dispatched, {} acknowledged, {} dropped",
        stats.materialized,
        stats.dispatched,
        stats.acknowledged,
        stats.dropped
    );
}
