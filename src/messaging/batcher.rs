// Parameter Batcher - Coalesces control changes into per-target batches
//
// Flushing is the only path that sends across the control/render boundary.

use crate::sequencer::note::TargetId;
use std::collections::{BTreeMap, HashMap};

/// Bounds on how long values may wait in a batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatcherLimits {
    /// Force a flush once a target holds this many distinct parameters
    pub max_entries: usize,
    /// Force a flush once a batch is this old (seconds)
    pub max_age: f64,
}

impl Default for BatcherLimits {
    fn default() -> Self {
        Self {
            max_entries: 32,
            max_age: 0.016,
        }
    }
}

/// Options for a single `set_parameter` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetOptions {
    /// Flush this target right away
    pub immediate: bool,
    /// Higher batches are sent first
    pub priority: u8,
}

impl SetOptions {
    pub fn immediate() -> Self {
        Self {
            immediate: true,
            priority: 0,
        }
    }

    pub fn with_priority(priority: u8) -> Self {
        Self {
            immediate: false,
            priority,
        }
    }
}

/// One consolidated message for one target
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterBatch {
    pub target: TargetId,
    /// Parameter name and latest value, sorted by name
    pub values: Vec<(String, f32)>,
    pub priority: u8,
    pub created_at: f64,
}

impl ParameterBatch {
    pub fn get(&self, key: &str) -> Option<f32> {
        self.values
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| *value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Destination of flushed batches
///
/// A sink that cannot take the batch hands it back.
pub trait BatchSink {
    fn send_batch(&mut self, batch: ParameterBatch) -> Result<(), ParameterBatch>;
}

impl BatchSink for Vec<ParameterBatch> {
    fn send_batch(&mut self, batch: ParameterBatch) -> Result<(), ParameterBatch> {
        self.push(batch);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct BatchEntry {
    values: BTreeMap<String, f32>,
    priority: u8,
    created_at: f64,
}

impl BatchEntry {
    fn into_batch(self, target: TargetId) -> ParameterBatch {
        ParameterBatch {
            target,
            values: self.values.into_iter().collect(),
            priority: self.priority,
            created_at: self.created_at,
        }
    }
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatcherStats {
    pub batches_sent: u64,
    pub forced_flushes: u64,
    pub immediate_flushes: u64,
    pub send_failures: u64,
}

#[derive(Debug, Default)]
pub struct ParameterBatcher {
    limits: BatcherLimits,
    pending: HashMap<TargetId, BatchEntry>,
    stats: BatcherStats,
}

impl ParameterBatcher {
    pub fn new(limits: BatcherLimits) -> Self {
        Self {
            limits,
            pending: HashMap::new(),
            stats: BatcherStats::default(),
        }
    }

    pub fn limits(&self) -> BatcherLimits {
        self.limits
    }

    pub fn stats(&self) -> BatcherStats {
        self.stats
    }

    pub fn pending_targets(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Value waiting to be sent, if any
    pub fn pending_value(&self, target: TargetId, key: &str) -> Option<f32> {
        self.pending
            .get(&target)
            .and_then(|entry| entry.values.get(key).copied())
    }

    /// Store a value (last write wins) and flush if a trigger fires
    ///
    /// Returns the number of batches sent.
    pub fn set_parameter(
        &mut self,
        target: TargetId,
        key: &str,
        value: f32,
        options: SetOptions,
        now: f64,
        sink: &mut impl BatchSink,
    ) -> usize {
        let entry = self.pending.entry(target).or_insert_with(|| BatchEntry {
            values: BTreeMap::new(),
            priority: options.priority,
            created_at: now,
        });
        entry.priority = entry.priority.max(options.priority);
        entry.values.insert(key.to_string(), value);

        if options.immediate {
            self.stats.immediate_flushes += 1;
            return self.flush_target(target, sink);
        }

        let full = entry.values.len() >= self.limits.max_entries;
        let stale = now - entry.created_at >= self.limits.max_age;
        if full || stale {
            self.stats.forced_flushes += 1;
            return self.flush_target(target, sink);
        }
        0
    }

    /// Send one target's batch
    pub fn flush_target(&mut self, target: TargetId, sink: &mut impl BatchSink) -> usize {
        match self.pending.remove(&target) {
            Some(entry) => self.send(entry.into_batch(target), sink),
            None => 0,
        }
    }

    /// Per-cycle flush: every pending batch, highest priority first, then oldest
    pub fn flush_all(&mut self, sink: &mut impl BatchSink) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        let mut batches: Vec<ParameterBatch> = self
            .pending
            .drain()
            .map(|(target, entry)| entry.into_batch(target))
            .collect();
        batches.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.total_cmp(&b.created_at))
                .then(a.target.cmp(&b.target))
        });

        batches
            .into_iter()
            .map(|batch| self.send(batch, sink))
            .sum()
    }

    fn send(&mut self, batch: ParameterBatch, sink: &mut impl BatchSink) -> usize {
        match sink.send_batch(batch) {
            Ok(()) => {
                self.stats.batches_sent += 1;
                1
            }
            Err(batch) => {
                self.stats.send_failures += 1;
                log::warn!(
                    "Parameter batch for target {} not delivered, keeping {} value(s)",
                    batch.target,
                    batch.len()
                );
                self.requeue(batch);
                0
            }
        }
    }

    /// Put an undelivered batch back without overwriting newer writes
    fn requeue(&mut self, batch: ParameterBatch) {
        let entry = self.pending.entry(batch.target).or_insert_with(|| BatchEntry {
            values: BTreeMap::new(),
            priority: batch.priority,
            created_at: batch.created_at,
        });
        entry.priority = entry.priority.max(batch.priority);
        entry.created_at = entry.created_at.min(batch.created_at);
        for (key, value) in batch.values {
            entry.values.entry(key).or_insert(value);
        }
    }
}
