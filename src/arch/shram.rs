use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Physical SHRAM banks.
pub const SHRAM_BANKS: u32 = 48;
pub const BANK_SIZE_BYTES: u32 = 1024;
/// Banks at the bottom of SHRAM owned by the output stage.
pub const SHRAM_RESERVED_OUTPUT_BANKS: u32 = 2;
/// Banks at the top that are never handed out.
pub const SHRAM_RESERVED_UNUSED_BANKS: u32 = 2;
/// Minimum tail reservation (LUT) below the unused banks.
pub const SHRAM_RESERVED_END_BANKS: u32 = 2;
pub const SHRAM_TOTAL_BANKS: u32 = SHRAM_BANKS - SHRAM_RESERVED_UNUSED_BANKS;

/// Allocation granules, in banks.
pub const IFM_GRANULE: u32 = 8;
pub const ACC_GRANULE: u32 = 16;

/// Accumulator width used for every non-elementwise operation.
pub const ACC_BITS: u32 = 32;
/// `ACC_FORMAT` value for 32-bit integer accumulators.
pub const ACC_FORMAT_INT32: u32 = 0;

/// Bank boundaries of one block configuration.
///
/// Banks are laid out bottom-up as: reserved output banks, input block,
/// second input block (elementwise only), accumulators, reserved tail.
/// The accumulators are placed downwards from the tail, so the input
/// and accumulator regions grow towards each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShramLayout {
  pub ib_start: u32,
  pub ib_start2: u32,
  pub ib_end: u32,
  pub ab_start: u32,
  pub lut_start: u32,
}

impl ShramLayout {
  pub fn input_banks(&self) -> Range<u32> {
    self.ib_start..self.ib_start2
  }

  /// Empty unless the layout was built for an elementwise operation.
  pub fn ifm2_banks(&self) -> Range<u32> {
    self.ib_start2..self.ib_end
  }

  pub fn accumulator_banks(&self) -> Range<u32> {
    self.ab_start..self.lut_start
  }

  pub fn reserved_banks(&self) -> Range<u32> {
    self.lut_start..SHRAM_TOTAL_BANKS
  }

  /// Total banks claimed, including the reserved output banks.
  pub fn used_banks(&self) -> u32 {
    SHRAM_RESERVED_OUTPUT_BANKS
      + range_len(&self.input_banks())
      + range_len(&self.ifm2_banks())
      + range_len(&self.accumulator_banks())
      + range_len(&self.reserved_banks())
  }

  /// Checks the ordering the hardware relies on: regions are contiguous,
  /// non-overlapping and stay inside the bank budget.
  pub fn is_valid(&self) -> bool {
    SHRAM_RESERVED_OUTPUT_BANKS <= self.ib_start
      && self.ib_start <= self.ib_start2
      && self.ib_start2 <= self.ib_end
      && self.ib_end <= self.ab_start
      && self.ab_start <= self.lut_start
      && self.lut_start <= SHRAM_TOTAL_BANKS
  }
}

fn range_len(range: &Range<u32>) -> u32 {
  range.end.saturating_sub(range.start)
}
