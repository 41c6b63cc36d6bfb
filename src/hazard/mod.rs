//! Wait insertion between the DMA and compute queues
pub mod ring_buffer;
pub mod waits;

pub use ring_buffer::RingBuffer;
pub use waits::{
  calc_blockdep, compute_waits, QueueTracker, Waits, MAX_BLOCKDEP, MAX_OUTSTANDING_DMA_OPS, MAX_OUTSTANDING_NPU_OPS,
};
