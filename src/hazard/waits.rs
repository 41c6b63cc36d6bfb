use super::ring_buffer::RingBuffer;
use crate::arch::shram::SHRAM_RESERVED_UNUSED_BANKS;
use crate::graph::{MemoryAccesses, Operation};

pub const MAX_OUTSTANDING_DMA_OPS: usize = 2;
pub const MAX_OUTSTANDING_NPU_OPS: usize = 2;
pub const MAX_BLOCKDEP: u32 = 3;

/// Wait counts attached to one operation.
///
/// `dma` is only ever set on compute operations and `compute` only on DMA
/// operations: each names how many of the most recent operations of the
/// other queue may still be in flight when this one issues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Waits {
  pub dma: Option<u32>,
  pub compute: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
struct Outstanding {
  index: usize,
  accesses: MemoryAccesses,
}

/// Tracks the in-flight window of both queues.
#[derive(Debug)]
pub struct QueueTracker {
  dma: RingBuffer<Outstanding>,
  compute: RingBuffer<Outstanding>,
}

impl Default for QueueTracker {
  fn default() -> Self {
    Self::new()
  }
}

impl QueueTracker {
  pub fn new() -> Self {
    Self {
      dma: RingBuffer::new(MAX_OUTSTANDING_DMA_OPS),
      compute: RingBuffer::new(MAX_OUTSTANDING_NPU_OPS),
    }
  }

  /// Issues `op` and returns the waits it needs against the other queue.
  pub fn issue(&mut self, index: usize, op: &Operation) -> Waits {
    let current = Outstanding {
      index,
      accesses: op.memory_accesses(),
    };

    let mut waits = Waits::default();
    if op.is_dma() {
      self.dma.push_evict(current);
      waits.compute = wait_on(&mut self.compute, &current);
    } else {
      self.compute.push_evict(current);
      waits.dma = wait_on(&mut self.dma, &current);
    }
    waits
  }
}

/// Finds the most recent conflicting entry of `window` and retires it with everything older.
fn wait_on(window: &mut RingBuffer<Outstanding>, current: &Outstanding) -> Option<u32> {
  let distance = window
    .iter_newest_first()
    .position(|other| other.accesses.conflicts_with(&current.accesses))?;

  if let Some(other) = window.newest(distance) {
    log::trace!("op {} waits for op {} (distance {})", current.index, other.index, distance);
  }
  window.retire_from(distance);
  Some(distance as u32)
}

/// Per-operation wait counts, in program order.
pub fn compute_waits(operations: &[Operation]) -> Vec<Waits> {
  let mut tracker = QueueTracker::new();
  operations
    .iter()
    .enumerate()
    .map(|(index, op)| tracker.issue(index, op))
    .collect()
}

fn uses_lut(op: &Operation) -> bool {
  matches!(op, Operation::Elementwise { lut_bytes, .. } if *lut_bytes > 0)
}

/// Pipeline overlap allowed between consecutive compute operations.
///
/// The feature maps of `prev` and `op` are not compared: any predecessor
/// gets the maximum, which is always safe.
pub fn calc_blockdep(prev: Option<&Operation>, op: &Operation) -> u32 {
  let Some(prev) = prev else {
    return 0;
  };

  // A LUT in the reserved banks only clobbers the next op when no spare banks exist.
  if uses_lut(prev) && SHRAM_RESERVED_UNUSED_BANKS == 0 && !uses_lut(op) {
    return 0;
  }

  MAX_BLOCKDEP
}
