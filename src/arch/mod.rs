pub mod shram;

use serde::{Deserialize, Serialize};

pub use shram::ShramLayout;

/// Height x width x depth triple used for tensor shapes and hardware blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
  pub height: u32,
  pub width: u32,
  pub depth: u32,
}

impl Block {
  pub const fn new(height: u32, width: u32, depth: u32) -> Self {
    Self { height, width, depth }
  }

  pub fn elements(&self) -> u64 {
    self.height as u64 * self.width as u64 * self.depth as u64
  }

  pub fn is_empty(&self) -> bool {
    self.height == 0 || self.width == 0 || self.depth == 0
  }
}

/// Micro-block granularity of the IFM fetch.
pub const IFM_UBLOCK: Block = Block::new(2, 2, 8);
/// Micro-block granularity of the OFM write-back; block shapes align to it.
pub const OFM_UBLOCK: Block = Block::new(2, 2, 8);
/// Largest OFM block the MAC array can iterate over.
pub const ARCH_OFM_BLOCK_MAX: Block = Block::new(64, 32, 128);
/// Largest kernel the hardware walks without sub-kernel decomposition.
pub const SUB_KERNEL_MAX: Block = Block::new(8, 8, 65536);
/// Once the OFM depth exceeds one split, block depths step in this unit.
pub const ARCH_SPLIT_DEPTH: u32 = 16;

/// Memory regions addressed by the command stream.
pub const COEFS_REGION: u32 = 0;
pub const IO_REGION: u32 = 1;
pub const SCRATCH_REGION: u32 = 2;

/// Hardware generation the command stream targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
  U55,
  #[default]
  U65,
}

impl Variant {
  /// Only U65 exposes the SHRAM boundary registers to software.
  pub fn has_shram_registers(&self) -> bool {
    matches!(self, Variant::U65)
  }
}

pub fn align_up(value: u32, align: u32) -> u32 {
  value.div_ceil(align) * align
}

pub fn div_round_up(value: u32, div: u32) -> u32 {
  value.div_ceil(div)
}
