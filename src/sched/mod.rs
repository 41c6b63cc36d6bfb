pub mod block_config;

use serde::{Deserialize, Serialize};

use crate::arch::{Block, ShramLayout};
use crate::error::SchedulingError;
use crate::graph::Operation;

pub use block_config::{find_block_config, try_block_config};

/// Tile shape the hardware iterates over, and where its buffers live in SHRAM.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockConfig {
  pub ofm_block: Block,
  pub ifm_block: Block,
  pub shram_layout: ShramLayout,
  /// Value programmed into `ACC_FORMAT` on parts with SHRAM registers.
  #[serde(default)]
  pub acc_format: u32,
}

impl BlockConfig {
  /// The zeroed default is what the search returns when nothing fits.
  pub fn is_empty(&self) -> bool {
    self.ofm_block.is_empty()
  }
}

/// Block configuration for one operation. DMA operations get the zeroed default.
pub fn schedule(op: &Operation) -> BlockConfig {
  find_block_config(op)
}

/// Schedules every compute operation in place.
pub fn schedule_all(operations: &mut [Operation]) -> Result<(), SchedulingError> {
  for (index, op) in operations.iter_mut().enumerate() {
    if op.is_dma() {
      continue;
    }

    let config = schedule(op);
    if config.is_empty() {
      return Err(SchedulingError::NoBlockConfig { index, kind: op.kind() });
    }

    if let Some(common) = op.common_mut() {
      common.block_config = Some(config);
    }
  }

  Ok(())
}
