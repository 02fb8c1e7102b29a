// Object Pool - Zero-allocation slot management
//
// Pre-allocates every slot at construction so the audio callback never
// allocates. Capacity is fixed: running out is reported, never papered over
// by growing.

use thiserror::Error;

/// Types that can live in an `ObjectPool`
///
/// `reset` must leave the value indistinguishable from a freshly constructed
/// one; the pool calls it on every release.
pub trait Poolable {
    fn reset(&mut self);
}

/// Pool errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("Pool '{pool}' exhausted (capacity {capacity})")]
    Exhausted { pool: &'static str, capacity: usize },

    #[error("Pool '{pool}': slot {index} released twice")]
    DoubleRelease { pool: &'static str, index: usize },

    #[error("Pool '{pool}': stale handle for slot {index}")]
    StaleHandle { pool: &'static str, index: usize },

    #[error("Pool '{pool}': slot index {index} out of range")]
    InvalidHandle { pool: &'static str, index: usize },
}

impl PoolError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, PoolError::Exhausted { .. })
    }
}

/// Handle to an acquired slot
///
/// The generation changes on every acquire, so a handle kept after release
/// cannot reach the slot's next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle {
    index: u32,
    generation: u32,
}

impl PoolHandle {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    generation: u32,
    active: bool,
}

/// Fixed-capacity pool with a free list of slot indices
#[derive(Debug)]
pub struct ObjectPool<T: Poolable> {
    name: &'static str,
    slots: Vec<Slot<T>>,
    /// Free slot indices (pre-allocated to full capacity)
    free: Vec<u32>,
}

impl<T: Poolable> ObjectPool<T> {
    /// Create a pool of `capacity` slots built by `factory`
    pub fn new(name: &'static str, capacity: usize, mut factory: impl FnMut() -> T) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                value: factory(),
                generation: 0,
                active: false,
            })
            .collect();
        // Reversed so slot 0 is handed out first
        let free = (0..capacity as u32).rev().collect();

        Self { name, slots, free }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn active_count(&self) -> usize {
        self.capacity() - self.available()
    }

    /// Take a free slot
    pub fn acquire(&mut self) -> Result<PoolHandle, PoolError> {
        let index = self.free.pop().ok_or(PoolError::Exhausted {
            pool: self.name,
            capacity: self.slots.len(),
        })?;
        let slot = &mut self.slots[index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.active = true;

        Ok(PoolHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Reset a slot and return it to the free list
    ///
    /// A second release of the same handle is rejected and leaves the free
    /// list untouched.
    pub fn release(&mut self, handle: PoolHandle) -> Result<(), PoolError> {
        let index = handle.index();
        let slot = self.slots.get_mut(index).ok_or(PoolError::InvalidHandle {
            pool: self.name,
            index,
        })?;

        if slot.generation != handle.generation {
            return Err(PoolError::StaleHandle {
                pool: self.name,
                index,
            });
        }
        if !slot.active {
            return Err(PoolError::DoubleRelease {
                pool: self.name,
                index,
            });
        }

        slot.value.reset();
        slot.active = false;
        self.free.push(handle.index);
        Ok(())
    }

    /// Release every active slot
    pub fn release_all(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.active {
                slot.value.reset();
                slot.active = false;
                self.free.push(index as u32);
            }
        }
    }

    pub fn is_active(&self, handle: PoolHandle) -> bool {
        self.slots
            .get(handle.index())
            .is_some_and(|slot| slot.active && slot.generation == handle.generation)
    }

    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        self.slots
            .get(handle.index())
            .filter(|slot| slot.active && slot.generation == handle.generation)
            .map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index())
            .filter(|slot| slot.active && slot.generation == handle.generation)
            .map(|slot| &mut slot.value)
    }

    /// Iterate over active slots
    pub fn iter_active(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.active)
            .map(|(index, slot)| {
                (
                    PoolHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    &slot.value,
                )
            })
    }

    /// First active slot matching `predicate`
    pub fn find_active(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<PoolHandle> {
        self.iter_active()
            .find(|(_, value)| predicate(value))
            .map(|(handle, _)| handle)
    }
}

impl<T: Poolable + Default> ObjectPool<T> {
    pub fn with_default(name: &'static str, capacity: usize) -> Self {
        Self::new(name, capacity, T::default)
    }
}

/// Pre-allocated f32 buffer for per-cycle scratch work
#[derive(Debug, Clone, PartialEq)]
pub struct ScratchBuffer {
    data: Vec<f32>,
}

impl ScratchBuffer {
    pub fn new(frames: usize) -> Self {
        Self {
            data: vec![0.0; frames],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

impl Poolable for ScratchBuffer {
    fn reset(&mut self) {
        // Keep the allocation, clear the contents
        self.data.fill(0.0);
    }
}
