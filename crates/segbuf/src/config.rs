//! Buffer manager configuration parameters.

use crate::error::SegbufError;

/// How physical capacity increases when a request does not fit even after
/// defragmentation.
///
/// Every policy grows to at least the required slot count, so an allocation
/// retried after growth always succeeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrowthPolicy {
    /// Grow to exactly the required slot count.
    Exact,
    /// Double the current capacity until it covers the requirement.
    Doubling,
    /// Grow in fixed increments of `step` slots.
    Linear {
        /// Slots added per increment. Must be positive.
        step: usize,
    },
}

impl GrowthPolicy {
    /// Capacity to grow to, given the current capacity and the minimum
    /// needed. Returns `None` on overflow.
    pub fn next_capacity(&self, current: usize, required: usize) -> Option<usize> {
        if required <= current {
            return Some(current);
        }
        match *self {
            Self::Exact => Some(required),
            Self::Doubling => {
                let mut cap = current.max(1);
                while cap < required {
                    cap = cap.checked_mul(2)?;
                }
                Some(cap)
            }
            Self::Linear { step } => {
                let short = required - current;
                let steps = short.div_ceil(step);
                current.checked_add(steps.checked_mul(step)?)
            }
        }
    }
}

/// Configuration for a [`BufferManager`](crate::BufferManager).
///
/// Validated at construction; immutable afterwards.
#[derive(Clone, Debug)]
pub struct BufferConfig {
    /// Width of one element slot in bytes. Views must use an element type
    /// of exactly this size.
    ///
    /// Default: 4 (one `f32`/`u32`).
    pub element_size: usize,

    /// Number of slots reserved at construction. Also the floor for
    /// [`shrink_to_fit`](crate::BufferManager::shrink_to_fit).
    ///
    /// Default: 1024.
    pub initial_capacity: usize,

    /// Capacity growth policy.
    ///
    /// Default: [`GrowthPolicy::Doubling`].
    pub growth: GrowthPolicy,
}

impl BufferConfig {
    /// Default slot width in bytes.
    pub const DEFAULT_ELEMENT_SIZE: usize = 4;

    /// Default initial capacity in slots.
    pub const DEFAULT_INITIAL_CAPACITY: usize = 1024;

    /// Default growth policy.
    pub const DEFAULT_GROWTH: GrowthPolicy = GrowthPolicy::Doubling;

    /// Create a config for slots of `element_size` bytes.
    ///
    /// Uses default values for all other parameters.
    pub fn new(element_size: usize) -> Self {
        Self {
            element_size,
            initial_capacity: Self::DEFAULT_INITIAL_CAPACITY,
            growth: Self::DEFAULT_GROWTH,
        }
    }

    /// Config whose slot width matches `T`.
    pub fn for_element<T>() -> Self {
        Self::new(std::mem::size_of::<T>())
    }

    /// Set the initial capacity in slots.
    pub fn with_initial_capacity(mut self, slots: usize) -> Self {
        self.initial_capacity = slots;
        self
    }

    /// Set the growth policy.
    pub fn with_growth(mut self, growth: GrowthPolicy) -> Self {
        self.growth = growth;
        self
    }

    /// Size in bytes of `slots` element slots.
    pub fn bytes_for(&self, slots: usize) -> Option<usize> {
        slots.checked_mul(self.element_size)
    }

    /// Check the configuration for values the manager cannot work with.
    pub fn validate(&self) -> Result<(), SegbufError> {
        if self.element_size == 0 {
            return Err(SegbufError::InvalidConfig {
                reason: "element_size must be positive".into(),
            });
        }
        if let GrowthPolicy::Linear { step: 0 } = self.growth {
            return Err(SegbufError::InvalidConfig {
                reason: "linear growth step must be positive".into(),
            });
        }
        if self.bytes_for(self.initial_capacity).is_none() {
            return Err(SegbufError::InvalidConfig {
                reason: format!(
                    "initial_capacity {} overflows at {} bytes per slot",
                    self.initial_capacity, self.element_size
                ),
            });
        }
        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ELEMENT_SIZE)
    }
}
